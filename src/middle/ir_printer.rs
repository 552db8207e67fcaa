//! IR Printer - Pretty print Mx IR
//!
//! LLVM-flavoured text, written by the `mxc` binary and used in tests.

use std::fmt::{self, Write};

use crate::middle::ir::*;

/// Pretty printer for Mx IR
pub struct IRPrinter<'m> {
    module: &'m IRModule,
}

impl<'m> IRPrinter<'m> {
    pub fn new(module: &'m IRModule) -> Self {
        Self { module }
    }

    fn print_header(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; Module: {}", self.module.name)?;
        writeln!(f, "; Functions: {}", self.module.functions.len())?;
        writeln!(f)
    }

    fn print_structs(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for s in &self.module.structs {
            let fields: Vec<String> = s.fields.iter().map(|(_, ty)| ty.to_string()).collect();
            writeln!(f, "%{} = type {{ {} }}", s.name, fields.join(", "))?;
        }
        if !self.module.structs.is_empty() {
            writeln!(f)?;
        }
        Ok(())
    }

    fn print_globals(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for global in &self.module.globals {
            match &global.init {
                Some(init) => writeln!(f, "@{} = global {} {}", global.name, global.ty, init)?,
                None => writeln!(f, "@{} = global {} zeroinitializer", global.name, global.ty)?,
            }
        }
        if !self.module.globals.is_empty() {
            writeln!(f)?;
        }
        Ok(())
    }

    fn print_externs(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for ext in &self.module.externs {
            let params: Vec<String> = ext.params.iter().map(IRType::to_string).collect();
            writeln!(f, "declare {} @{}({})", ext.ret_type, ext.name, params.join(", "))?;
        }
        if !self.module.externs.is_empty() {
            writeln!(f)?;
        }
        Ok(())
    }

    /// Print a function
    fn print_function(&self, f: &mut fmt::Formatter<'_>, func: &IRFunction) -> fmt::Result {
        // Function signature
        write!(f, "define {} @{}(", func.ret_type, func.name)?;
        for (i, (_, ty)) in func.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{} {}", ty, Value::Parameter(i))?;
        }
        writeln!(f, ") {{")?;

        // Basic blocks
        for block in &func.blocks {
            self.print_block(f, func, block)?;
        }

        writeln!(f, "}}")
    }

    /// Print a basic block
    fn print_block(&self, f: &mut fmt::Formatter<'_>, func: &IRFunction, block: &BasicBlock) -> fmt::Result {
        writeln!(f, "{}:", block.label)?;

        for inst in &block.instructions {
            f.write_str("  ")?;
            self.print_instruction(f, func, inst)?;
            writeln!(f)?;
        }

        if let Some(term) = &block.terminator {
            f.write_str("  ")?;
            self.print_terminator(f, func, term)?;
            writeln!(f)?;
        }
        Ok(())
    }

    /// Print an instruction
    fn print_instruction(&self, f: &mut fmt::Formatter<'_>, func: &IRFunction, inst: &Instruction) -> fmt::Result {
        match inst {
            Instruction::BinOp { dest, op, left, right } => write!(f, "{} = {} {}, {}", dest, op, left, right),
            Instruction::UnaryOp { dest, op, value } => write!(f, "{} = {} {}", dest, op, value),
            Instruction::Call { dest, func: callee, args } => {
                if let Some(dest) = dest {
                    write!(f, "{} = ", dest)?;
                }
                write!(f, "call @{}({})", callee, join(args))
            }
            Instruction::Alloca { dest, ty } => write!(f, "{} = alloca {}", dest, ty),
            Instruction::Load { dest, ptr, ty } => write!(f, "{} = load {}, {}", dest, ty, ptr),
            Instruction::Store { ptr, value } => write!(f, "store {}, {}", value, ptr),
            Instruction::GetElementPtr { dest, ptr, index, elem_ty } => {
                write!(f, "{} = gep {}, {}, {}", dest, elem_ty, ptr, index)
            }
            Instruction::FieldPtr { dest, object, class, index } => {
                write!(f, "{} = fieldptr %{}, {}, {}", dest, class, object, index)
            }
            Instruction::Phi { dest, ty, incoming } => {
                write!(f, "{} = phi {} ", dest, ty)?;
                for (i, (value, block)) in incoming.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "[{}, %{}]", value, label(func, *block))?;
                }
                Ok(())
            }
            Instruction::NewObject { dest, class } => write!(f, "{} = new %{}", dest, class),
            Instruction::NewArray { dest, elem_ty, length } => write!(f, "{} = newarray {}, {}", dest, elem_ty, length),
            Instruction::ArrayLength { dest, array } => write!(f, "{} = length {}", dest, array),
        }
    }

    /// Print a terminator
    fn print_terminator(&self, f: &mut fmt::Formatter<'_>, func: &IRFunction, term: &Terminator) -> fmt::Result {
        match term {
            Terminator::Return { value: Some(v) } => write!(f, "ret {}", v),
            Terminator::Return { value: None } => f.write_str("ret void"),
            Terminator::Jump { target } => write!(f, "br label %{}", label(func, *target)),
            Terminator::Branch { cond, then_target, else_target } => write!(
                f,
                "br {}, label %{}, label %{}",
                cond,
                label(func, *then_target),
                label(func, *else_target)
            ),
        }
    }
}

impl fmt::Display for IRPrinter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.print_header(f)?;
        self.print_structs(f)?;
        self.print_globals(f)?;
        self.print_externs(f)?;
        for func in &self.module.functions {
            self.print_function(f, func)?;
            writeln!(f)?;
        }
        Ok(())
    }
}

fn label(func: &IRFunction, id: BlockId) -> &str {
    func.block(id).map_or("?", |b| b.label.as_str())
}

fn join(values: &[Value]) -> String {
    let mut out = String::new();
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        // Writing to a String cannot fail
        let _ = write!(out, "{}", value);
    }
    out
}

/// Print an IR module to string
pub fn print_module(module: &IRModule) -> String {
    IRPrinter::new(module).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_print_function() {
        let mut module = IRModule::new("test");
        module.add_extern("printInt", vec![IRType::I32], IRType::Void);
        let mut func = IRFunction::new("f", vec![("a".to_string(), IRType::I32)], IRType::I32);
        let entry = func.add_block("entry");
        let exit = func.add_block("exit");
        let block = func.get_block_mut(entry).unwrap();
        block.push(Instruction::BinOp {
            dest: Register(0),
            op: BinOp::Add,
            left: Value::Parameter(0),
            right: Value::Constant(Constant::Int(1)),
        });
        block.push(Instruction::Call {
            dest: None,
            func: "printInt".to_string(),
            args: vec![Value::Register(Register(0))],
        });
        block.set_terminator(Terminator::Jump { target: exit });
        func.get_block_mut(exit)
            .unwrap()
            .set_terminator(Terminator::Return { value: Some(Value::Register(Register(0))) });
        module.functions.push(func);

        let expected = "\
; Module: test
; Functions: 1

declare void @printInt(i32)

define i32 @f(i32 %arg0) {
entry:
  %0 = add %arg0, 1
  call @printInt(%0)
  br label %exit
exit:
  ret %0
}

";
        assert_eq!(print_module(&module), expected);
    }

    #[test]
    fn test_print_structs_and_globals() {
        let mut module = IRModule::new("test");
        module.add_struct("Node", vec![("value".to_string(), IRType::I32), ("next".to_string(), IRType::ptr_to(IRType::Struct("Node".to_string())))]);
        module.globals.push(IRGlobal { name: "n".to_string(), ty: IRType::I32, init: Some(Constant::Int(-1)) });
        module.globals.push(IRGlobal { name: "s".to_string(), ty: IRType::ptr_to(IRType::I8), init: None });
        let text = print_module(&module);
        assert!(text.contains("%Node = type { i32, %Node* }\n"));
        assert!(text.contains("@n = global i32 -1\n"));
        assert!(text.contains("@s = global i8* zeroinitializer\n"));
    }
}
