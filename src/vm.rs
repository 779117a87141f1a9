//! The bytecode virtual machine.

use std::collections::HashMap;
use std::rc::Rc;

use crate::compiler;
use crate::prelude::{Chunk, InterpretationError, OpCode, Value};

/// Used as the minimum capacity of the stack.
/// Since we're using a growable [Vec], the stack size can be arbitrarily large.
const STACK_SIZE: usize = 256;

/// The largest the value stack is allowed to grow before a deeply-nested expression is reported
/// as a runtime "Stack overflow." error, rather than exhausting host memory.
///
/// The book's C implementation bounds this at `FRAMES_MAX * UINT8_COUNT` (16384), sized for up to
/// 64 nested call frames of 256 locals each. Without user-defined function calls there are no
/// frames to multiply by, so this is just a small constant in the same spirit: generous enough
/// for any realistic expression, small enough to fail fast on a runaway one.
const MAX_STACK_SIZE: usize = 1024;

static_assertions::const_assert!(MAX_STACK_SIZE >= STACK_SIZE);

/// Maintains state for the Lox virtual machine.
///
/// A [VM] owns the global variable table, so that successive calls to [VM::interpret] (as in a
/// REPL, where each line is compiled and run separately) see each other's globals.
#[derive(Default)]
pub struct VM {
    globals: HashMap<Rc<str>, Value>,
}

/// A VM with an active chunk.
///
/// It's inconvenient in Rust to have a chunk possibly be absent, as the original C code does
/// between calls; [VmWithChunk] exists to capture the state in which the VM MUST have a chunk.
struct VmWithChunk<'a> {
    /// Instruction pointer --- index into the chunk for the next opcode to be executed
    ip: usize,
    /// Value stack -- modified as elements are pushed and popped from the stack.
    stack: Vec<Value>,
    chunk: &'a Chunk,
    globals: &'a mut HashMap<Rc<str>, Value>,
}

/// Fetches the next bytecode in the chunk, **AND** increments the instruction pointer.
///
/// Note: use [current_ip] to get the "current" value of the instruction pointer being executed
/// right now.
macro_rules! next_bytecode {
    ($self: ident, $chunk: ident) => {{
        let byte = $chunk.get($self.ip);
        $self.ip += 1;
        byte
    }};
}

/// Gets the value of the current instruction pointer. To be used in conjunction with
/// [next_bytecode].
macro_rules! current_ip {
    ($self: ident) => {
        $self.ip - 1
    };
}

impl VM {
    /// Creates a new VM with an empty global environment.
    pub fn new() -> Self {
        VM::default()
    }

    /// Interpret the given Lox source code, compiling it first.
    ///
    /// Globals defined by a prior call to [VM::interpret] remain visible to later calls, which is
    /// what lets a REPL build up state across several lines of input.
    pub fn interpret(&mut self, source: &str) -> crate::Result<()> {
        let chunk = compiler::compile(source)?;
        let mut vm = VmWithChunk {
            ip: 0,
            stack: Vec::with_capacity(STACK_SIZE),
            chunk: &chunk,
            globals: &mut self.globals,
        };
        vm.run()
    }
}

impl<'a> VmWithChunk<'a> {
    /// The main opcode interpreter loop.
    fn run(&mut self) -> crate::Result<()> {
        use OpCode::*;
        let chunk = self.chunk;

        loop {
            if cfg!(feature = "trace_execution") {
                use crate::debug::disassemble_instruction;

                let stack_trace: String = self.stack.iter().map(|value| format!("[ {value:?} ]")).collect();
                log::trace!("        {stack_trace}");
                disassemble_instruction(chunk, self.ip);
            }

            let opcode = next_bytecode!(self, chunk)
                .expect("I have an instruction pointer within range")
                .as_opcode();

            match opcode {
                Some(Constant) => {
                    let constant = next_bytecode!(self, chunk)
                        .expect("there should be an operand")
                        .resolve_constant()
                        .expect("there should be a constant at this index");
                    self.push(constant)?;
                }
                Some(Nil) => self.push(Value::Nil)?,
                Some(True) => self.push(true.into())?,
                Some(False) => self.push(false.into())?,
                Some(Pop) => {
                    self.pop();
                }
                Some(DefineGlobal) => {
                    let name = self.read_global_name();
                    let value = self.pop();
                    self.globals.insert(name, value);
                }
                Some(GetGlobal) => {
                    let name = self.read_global_name();
                    match self.globals.get(name.as_ref()) {
                        Some(value) => {
                            let value = value.clone();
                            self.push(value)?;
                        }
                        None => {
                            let message = format!("Undefined variable '{name}'.");
                            self.runtime_error(&message)?;
                        }
                    }
                }
                Some(SetGlobal) => {
                    let name = self.read_global_name();
                    if !self.globals.contains_key(name.as_ref()) {
                        let message = format!("Undefined variable '{name}'.");
                        self.runtime_error(&message)?;
                    } else {
                        // Assignment is an expression: leave the value on the stack.
                        let value = self.peek(0);
                        self.globals.insert(name, value);
                    }
                }
                Some(GetLocal) => {
                    let slot = next_bytecode!(self, chunk)
                        .expect("there should be an operand")
                        .as_byte();
                    let value = self.stack[slot as usize].clone();
                    self.push(value)?;
                }
                Some(SetLocal) => {
                    let slot = next_bytecode!(self, chunk)
                        .expect("there should be an operand")
                        .as_byte();
                    self.stack[slot as usize] = self.peek(0);
                }
                Some(Equal) => {
                    let rhs = self.pop();
                    let lhs = self.pop();
                    self.push((lhs == rhs).into())?;
                }
                Some(Greater) => self.number_binary_op(|a, b| a > b)?,
                Some(Less) => self.number_binary_op(|a, b| a < b)?,
                Some(Add) => self.add()?,
                Some(Subtract) => self.number_binary_op(|a, b| a - b)?,
                Some(Multiply) => self.number_binary_op(|a, b| a * b)?,
                Some(Divide) => self.number_binary_op(|a, b| a / b)?,
                Some(Not) => {
                    let value = self.pop();
                    self.push(value.is_falsy().into())?;
                }
                Some(Negate) => {
                    if let Some(number) = self.peek(0).as_number() {
                        self.pop();
                        self.push((-number).into())?;
                    } else {
                        self.runtime_error("Operand must be a number.")?;
                    }
                }
                Some(Print) => {
                    let value = self.pop();
                    println!("{value}");
                }
                Some(Jump) => {
                    let offset = self.read_u16();
                    self.ip += offset as usize;
                }
                Some(JumpIfFalse) => {
                    let offset = self.read_u16();
                    if self.peek(0).is_falsy() {
                        self.ip += offset as usize;
                    }
                }
                Some(Loop) => {
                    let offset = self.read_u16();
                    self.ip -= offset as usize;
                }
                Some(Return) => {
                    // A bare top-level program has nothing to return; the value stack should be
                    // empty by the time we get here.
                    debug_assert!(self.stack.is_empty());
                    return Ok(());
                }
                None => panic!("fetched invalid opcode at {}", current_ip!(self)),
            }
        }
    }

    /// Reads the identifier naming a global out of the constant pool, at the current instruction
    /// pointer.
    fn read_global_name(&mut self) -> Rc<str> {
        let chunk = self.chunk;
        next_bytecode!(self, chunk)
            .expect("there should be an operand")
            .resolve_constant()
            .expect("there should be a constant at this index")
            .as_rc_str()
            .expect("global variable names are always interned strings")
    }

    /// Reads the two-byte jump operand at the current instruction pointer, advancing past it.
    fn read_u16(&mut self) -> u16 {
        let value = self
            .chunk
            .get_u16(self.ip)
            .expect("there should be a 2-byte jump operand");
        self.ip += 2;
        value
    }

    /// Reports a runtime error to stderr and resets the VM to a clean, reusable state.
    ///
    /// Per the error-reporting rule, both the value stack and the globals table are reset: a
    /// runtime error aborts the whole program, so any globals it had defined so far should not
    /// leak into the next `interpret` call.
    fn runtime_error(&mut self, message: &str) -> crate::Result<()> {
        eprintln!("{message}");

        let line = self
            .chunk
            .line_number_for(current_ip!(self))
            .expect("line number");
        eprintln!("[line {line}] in script");

        self.reset_stack();
        self.globals.clear();

        Err(InterpretationError::RuntimeError)
    }

    /// `+`, which is overloaded: it adds two numbers, or concatenates two strings.
    fn add(&mut self) -> crate::Result<()> {
        let rhs = self.peek(0);
        let lhs = self.peek(1);

        if let (Some(a), Some(b)) = (lhs.as_number(), rhs.as_number()) {
            self.pop();
            self.pop();
            return self.push((a + b).into());
        }

        if lhs.as_str().is_some() && rhs.as_str().is_some() {
            let rhs = self.pop();
            let lhs = self.pop();
            return self.push(Value::concat_strings(&lhs, &rhs));
        }

        self.runtime_error("Operands must be two numbers or two strings.")
    }

    /// Pops two operands on the stack to perform a number-only binary operation.
    fn number_binary_op<F, T>(&mut self, op: F) -> crate::Result<()>
    where
        F: Fn(f64, f64) -> T,
        T: Into<Value>,
    {
        let rhs = self.peek(0);
        let lhs = self.peek(1);

        match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => {
                self.pop();
                self.pop();
                self.push(op(a, b).into())
            }
            _ => self.runtime_error("Operands must be numbers."),
        }
    }

    /// Pushes a [Value] on to the value stack.
    ///
    /// # Errors
    ///
    /// Reports a runtime "Stack overflow." error instead of growing the stack past
    /// [MAX_STACK_SIZE]. Deeply-nested expressions are the only way to drive this in a
    /// language with no user-defined function calls.
    fn push(&mut self, value: Value) -> crate::Result<()> {
        if self.stack.len() >= MAX_STACK_SIZE {
            return self.runtime_error("Stack overflow.");
        }
        self.stack.push(value);
        Ok(())
    }

    /// Pops and returns the top [Value] on the value stack.
    ///
    /// # Panics
    ///
    /// Panics when the value stack is empty. Given well-formed Lox bytecode, a pop cannot occur
    /// when the value stack is empty; therefore the interpreter panics if it is in this state.
    #[inline(always)]
    fn pop(&mut self) -> Value {
        self.stack.pop().expect("value stack is empty")
    }

    /// Peeks at the value relative to the top of the stack.
    ///
    /// # Panics
    ///
    ///  * When the stack is empty
    ///  * When the distance goes off the end of the stack
    #[inline(always)]
    fn peek(&self, distance: usize) -> Value {
        self.stack
            .get(self.stack.len() - 1 - distance)
            .cloned()
            .expect("peeked escaped bounds of the stack")
    }

    #[inline(always)]
    fn reset_stack(&mut self) {
        self.stack.clear()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn arithmetic_leaves_nothing_on_the_stack() {
        let mut vm = VM::new();
        assert!(vm.interpret("print 1 + 2 * 3;").is_ok());
    }

    #[test]
    fn globals_persist_across_separate_interpret_calls() {
        let mut vm = VM::new();
        assert!(vm.interpret("var x = 10;").is_ok());
        assert!(vm.interpret("print x + 1;").is_ok());
    }

    #[test]
    fn undefined_global_is_a_runtime_error() {
        let mut vm = VM::new();
        assert!(vm.interpret("print nonexistent;").is_err());
    }

    #[test]
    fn string_concatenation_works() {
        let mut vm = VM::new();
        assert!(vm.interpret(r#"print "foo" + "bar";"#).is_ok());
    }

    #[test]
    fn adding_number_to_string_is_a_runtime_error() {
        let mut vm = VM::new();
        assert!(vm.interpret(r#"print "foo" + 1;"#).is_err());
    }

    #[test]
    fn if_else_and_short_circuit_run_without_error() {
        let mut vm = VM::new();
        assert!(vm
            .interpret("if (1 < 2 and true) { print \"yes\"; } else { print \"no\"; }")
            .is_ok());
    }

    #[test]
    fn locals_in_nested_blocks_shadow_correctly() {
        let mut vm = VM::new();
        assert!(vm
            .interpret("var x = 1; { var x = 2; print x; } print x;")
            .is_ok());
    }

    #[test]
    fn runtime_error_clears_globals_so_the_vm_instance_is_reusable() {
        let mut vm = VM::new();
        assert!(vm.interpret("var x = 10; print x + \"nope\";").is_err());
        // `x` was wiped out by the error reset, so referencing it now is itself undefined.
        assert!(vm.interpret("print x;").is_err());
    }

    #[test]
    fn deeply_nested_expression_overflows_the_stack() {
        // Each `+(1` pushes one more constant before any `ADD` can reduce it away, so nesting
        // `depth` parenthesized additions drives the value stack to `depth + 1` entries deep.
        let depth = MAX_STACK_SIZE + 1;
        let mut source = "print 1".to_string();
        for _ in 0..depth {
            source.push_str("+(1");
        }
        for _ in 0..depth {
            source.push(')');
        }
        source.push(';');

        let mut vm = VM::new();
        assert!(vm.interpret(&source).is_err());
    }
}
