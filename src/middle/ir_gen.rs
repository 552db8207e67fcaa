//! IR Generator - annotated AST to Mx IR
//!
//! Expects a tree with no semantic errors. Anything the analyzer should have
//! rejected or annotated (an `Unknown` type, a missing symbol) is reported as
//! `Error::Internal`.
//!
//! Unreachable statements are dropped: once the current block has a
//! terminator, the rest of the enclosing statement list is not lowered.
//! Merge and exit blocks are always created, and any block still open at the
//! end of a function returns the default value of the return type.

use std::collections::HashMap;

use crate::frontend::ast::{self, Decl, Expr, ExprKind, ForInit, FunctionDecl, PrefixOp, Program, Stmt, SuffixOp};
use crate::frontend::semantic::Analysis;
use crate::frontend::symbols::{FunctionKind, Storage, Symbol, SymbolId};
use crate::middle::ir::{
    BinOp as IRBinOp, BlockId, Constant, IRFunction, IRGlobal, IRModule, IRType, Instruction, Register, Terminator,
    UnaryOp, Value,
};
use crate::types::{ClassId, Type, STRING_METHODS};
use crate::utils::{Error, Result};

// Every generated function name contains a `.`, which no MxLang identifier
// can, and methods are qualified by their class.

/// Runs global initializers that are not constants; called by `main` on its
/// first entry
pub const INIT_FUNCTION: &str = ".init";

/// Set once `INIT_FUNCTION` has run
pub const INIT_GUARD: &str = ".init.done";

/// Runtime helpers for string operators
const STRING_HELPERS: &[(ast::BinOp, &str)] = &[
    (ast::BinOp::Add, "string.concat"),
    (ast::BinOp::Eq, "string.eq"),
    (ast::BinOp::Ne, "string.ne"),
    (ast::BinOp::Lt, "string.lt"),
    (ast::BinOp::Le, "string.le"),
    (ast::BinOp::Gt, "string.gt"),
    (ast::BinOp::Ge, "string.ge"),
];

/// IR name of a method of class `class`
pub fn method_name(class: &str, method: &str) -> String {
    format!("{}.{}", class, method)
}

/// IR name of the constructor of `class`; `new` is never a method name
pub fn constructor_name(class: &str) -> String {
    method_name(class, "new")
}

/// IR name of a built-in `string` method
pub fn string_method_name(method: &str) -> String {
    method_name("string", method)
}

/// How a local variable or parameter is reached
#[derive(Debug, Clone)]
enum Binding {
    /// Never reassigned: the value itself
    Value(Value),
    /// Reassigned: an `alloca` slot
    Slot { ptr: Register, ty: IRType },
}

#[derive(Debug, Clone, Copy)]
struct LoopTarget {
    break_to: BlockId,
    continue_to: BlockId,
}

/// IR Generator
pub struct IRGenerator<'a> {
    analysis: &'a Analysis,
    /// Current module being built
    module: IRModule,
    /// Current function being built
    func: IRFunction,
    /// Current block ID
    current_block: BlockId,
    /// Register counter
    next_register: usize,
    /// Label counter for control-flow constructs
    next_label: usize,
    /// Number of allocas at the start of the entry block
    allocas: usize,
    locals: HashMap<SymbolId, Binding>,
    loops: Vec<LoopTarget>,
}

impl<'a> IRGenerator<'a> {
    pub fn new(module_name: &str, analysis: &'a Analysis) -> Self {
        Self {
            analysis,
            module: IRModule::new(module_name),
            func: IRFunction::new("", Vec::new(), IRType::Void),
            current_block: BlockId(0),
            next_register: 0,
            next_label: 0,
            allocas: 0,
            locals: HashMap::new(),
            loops: Vec::new(),
        }
    }

    /// Generate IR for a program
    pub fn generate(mut self, program: &Program) -> Result<IRModule> {
        self.declare_externs()?;
        self.generate_structs()?;
        let needs_init = self.generate_globals(program)?;

        for decl in &program.decls {
            match decl {
                Decl::Function(func) => {
                    let prologue = needs_init && func.name.name == "main";
                    self.generate_function(func, None, prologue)?;
                }
                Decl::Class(class) => {
                    let id = self
                        .analysis
                        .classes
                        .lookup(&class.name.name)
                        .ok_or_else(|| Error::internal(format!("class \"{}\" was not declared", class.name.name)))?;
                    for method in &class.methods {
                        self.generate_function(method, Some(id), false)?;
                    }
                    match class.constructors.first() {
                        Some(ctor) => self.generate_function(ctor, Some(id), false)?,
                        None => self.generate_default_constructor(id)?,
                    }
                }
                Decl::Variable(_) => {}
            }
        }

        self.module.verify()?;
        Ok(self.module)
    }

    fn declare_externs(&mut self) -> Result<()> {
        let string = IRType::ptr_to(IRType::I8);
        self.module.add_extern("print", vec![string.clone()], IRType::Void);
        self.module.add_extern("println", vec![string.clone()], IRType::Void);
        self.module.add_extern("printInt", vec![IRType::I32], IRType::Void);
        self.module.add_extern("printlnInt", vec![IRType::I32], IRType::Void);
        self.module.add_extern("getString", Vec::new(), string.clone());
        self.module.add_extern("getInt", Vec::new(), IRType::I32);
        self.module.add_extern("toString", vec![IRType::I32], string.clone());
        for (op, name) in STRING_HELPERS {
            let ret = if *op == ast::BinOp::Add { string.clone() } else { IRType::Bool };
            self.module.add_extern(name, vec![string.clone(), string.clone()], ret);
        }
        for (name, params, ret) in STRING_METHODS {
            let mut ir_params = vec![string.clone()];
            for param in params.iter() {
                ir_params.push(ir_type(param)?);
            }
            self.module.add_extern(&string_method_name(name), ir_params, ir_type(ret)?);
        }
        Ok(())
    }

    fn generate_structs(&mut self) -> Result<()> {
        for class in self.analysis.classes.iter() {
            let fields = class
                .fields()
                .map(|(name, ty)| Ok((name.to_string(), ir_type(ty)?)))
                .collect::<Result<Vec<_>>>()?;
            self.module.add_struct(&class.name, fields);
        }
        Ok(())
    }

    /// Lower global variables; returns whether `INIT_FUNCTION` was generated
    fn generate_globals(&mut self, program: &Program) -> Result<bool> {
        let mut deferred = Vec::new();
        for decl in &program.decls {
            let Decl::Variable(var) = decl else { continue };
            for declarator in &var.declarators {
                let symbol = self.symbol(declarator.symbol)?;
                let ty = ir_type(symbol.ty())?;
                let init = declarator.init.as_ref().and_then(constant_of);
                if init.is_none() {
                    if let Some(expr) = &declarator.init {
                        deferred.push((symbol.name().to_string(), expr));
                    }
                }
                self.module.globals.push(IRGlobal {
                    name: symbol.name().to_string(),
                    ty,
                    init,
                });
            }
        }
        if deferred.is_empty() {
            return Ok(false);
        }
        self.module.globals.push(IRGlobal {
            name: INIT_GUARD.to_string(),
            ty: IRType::Bool,
            init: Some(Constant::Bool(false)),
        });

        log::debug!("lowering {} global initializer(s) into {}", deferred.len(), INIT_FUNCTION);
        self.begin_function(IRFunction::new(INIT_FUNCTION, Vec::new(), IRType::Void));
        for (name, expr) in deferred {
            let value = self.generate_expr(expr)?;
            self.emit(Instruction::Store { ptr: Value::Global(name), value });
        }
        self.set_terminator(Terminator::Return { value: None });
        self.finish_function()?;
        Ok(true)
    }

    // ==================== Functions ====================

    fn begin_function(&mut self, func: IRFunction) {
        self.func = func;
        self.next_register = 0;
        self.next_label = 0;
        self.allocas = 0;
        self.locals.clear();
        self.loops.clear();
        self.current_block = self.func.add_block("entry");
    }

    fn finish_function(&mut self) -> Result<()> {
        let func = std::mem::replace(&mut self.func, IRFunction::new("", Vec::new(), IRType::Void));
        func.verify()?;
        log::debug!("lowered {} ({} blocks)", func.name, func.blocks.len());
        self.module.functions.push(func);
        Ok(())
    }

    /// Generate IR for a function, method or constructor
    fn generate_function(&mut self, func: &FunctionDecl, class: Option<ClassId>, call_init: bool) -> Result<()> {
        let symbol = self.symbol(func.symbol)?;
        let Type::Function { ret, .. } = symbol.ty() else {
            return Err(Error::internal(format!("\"{}\" has no function signature", func.name.name)));
        };
        let ret_ty = ret.as_ref().clone();

        let mut params = Vec::new();
        if let Some(class) = class {
            params.push(("this".to_string(), self.class_pointer(class)));
        }
        let offset = params.len();
        for param in &func.params {
            let ty = ir_type(self.symbol(param.symbol)?.ty())?;
            params.push((param.name.name.clone(), ty));
        }

        let name = match (class, symbol) {
            (Some(class), Symbol::Function { kind: FunctionKind::Constructor(_), .. }) => {
                constructor_name(&self.analysis.classes.get(class).name)
            }
            (Some(class), _) => method_name(&self.analysis.classes.get(class).name, symbol.name()),
            (None, _) => symbol.name().to_string(),
        };
        self.begin_function(IRFunction::new(&name, params, ir_type(&ret_ty)?));

        if call_init {
            self.generate_init_guard();
        }

        for (index, param) in func.params.iter().enumerate() {
            let id = param.symbol.ok_or_else(|| missing_symbol(&param.name.name))?;
            let value = Value::Parameter(index + offset);
            self.bind(id, Some(value))?;
        }

        self.generate_stmts(&func.body.stmts)?;

        if !self.is_terminated() {
            let value = default_value(&ret_ty);
            self.set_terminator(Terminator::Return { value });
        }
        self.finish_function()
    }

    /// Run the global initializers on the first entry into `main` only
    fn generate_init_guard(&mut self) {
        let n = self.next_label();
        let done = self.load(Value::Global(INIT_GUARD.to_string()), IRType::Bool);
        let run_id = self.add_block(&format!("init.{}.run", n));
        let end_id = self.add_block(&format!("init.{}.end", n));
        self.set_terminator(Terminator::Branch { cond: done, then_target: end_id, else_target: run_id });

        self.switch_to(run_id);
        self.emit(Instruction::Store {
            ptr: Value::Global(INIT_GUARD.to_string()),
            value: Value::Constant(Constant::Bool(true)),
        });
        self.emit(Instruction::Call { dest: None, func: INIT_FUNCTION.to_string(), args: Vec::new() });
        self.set_terminator(Terminator::Jump { target: end_id });

        self.switch_to(end_id);
    }

    /// Empty constructor for a class without a declared one
    fn generate_default_constructor(&mut self, class: ClassId) -> Result<()> {
        let name = constructor_name(&self.analysis.classes.get(class).name);
        let params = vec![("this".to_string(), self.class_pointer(class))];
        self.begin_function(IRFunction::new(&name, params, IRType::Void));
        self.set_terminator(Terminator::Return { value: None });
        self.finish_function()
    }

    /// Bind a local or parameter, giving it a slot if it is ever reassigned
    fn bind(&mut self, id: SymbolId, value: Option<Value>) -> Result<()> {
        let analysis = self.analysis;
        let symbol = analysis.symbols.get(id);
        let Symbol::Variable { ty, mutated, .. } = symbol else {
            return Err(Error::internal(format!("\"{}\" is not a variable", symbol.name())));
        };
        let value = value.unwrap_or_else(|| default_value(ty).unwrap_or(Value::Unit));
        let binding = if *mutated {
            let ir_ty = ir_type(ty)?;
            let ptr = self.alloc_register();
            self.emit_alloca(Instruction::Alloca { dest: ptr, ty: ir_ty.clone() });
            self.emit(Instruction::Store { ptr: Value::Register(ptr), value });
            Binding::Slot { ptr, ty: ir_ty }
        } else {
            Binding::Value(value)
        };
        self.locals.insert(id, binding);
        Ok(())
    }

    // ==================== Statements ====================

    /// Generate a statement list, dropping whatever follows a terminator
    fn generate_stmts(&mut self, stmts: &[Stmt]) -> Result<()> {
        for stmt in stmts {
            if self.is_terminated() {
                break;
            }
            self.generate_stmt(stmt)?;
        }
        Ok(())
    }

    /// Generate IR for a statement
    fn generate_stmt(&mut self, stmt: &Stmt) -> Result<()> {
        match stmt {
            Stmt::Block(block) => self.generate_stmts(&block.stmts),

            Stmt::Var(var) => self.generate_var_decl(var),

            Stmt::If { cond, then_branch, else_branch, .. } => {
                let n = self.next_label();
                let cond_val = self.generate_expr(cond)?;
                let then_id = self.add_block(&format!("if.{}.then", n));
                let else_id = match else_branch {
                    Some(_) => Some(self.add_block(&format!("if.{}.else", n))),
                    None => None,
                };
                let end_id = self.add_block(&format!("if.{}.end", n));

                self.set_terminator(Terminator::Branch {
                    cond: cond_val,
                    then_target: then_id,
                    else_target: else_id.unwrap_or(end_id),
                });

                self.switch_to(then_id);
                self.generate_stmt(then_branch)?;
                self.jump_if_open(end_id);

                if let (Some(else_id), Some(else_branch)) = (else_id, else_branch) {
                    self.switch_to(else_id);
                    self.generate_stmt(else_branch)?;
                    self.jump_if_open(end_id);
                }

                self.switch_to(end_id);
                Ok(())
            }

            Stmt::While { cond, body, .. } => {
                let n = self.next_label();
                let cond_id = self.add_block(&format!("while.{}.cond", n));
                let body_id = self.add_block(&format!("while.{}.body", n));
                let end_id = self.add_block(&format!("while.{}.end", n));

                self.set_terminator(Terminator::Jump { target: cond_id });

                // Condition check
                self.switch_to(cond_id);
                let cond_val = self.generate_expr(cond)?;
                self.set_terminator(Terminator::Branch {
                    cond: cond_val,
                    then_target: body_id,
                    else_target: end_id,
                });

                // Body
                self.switch_to(body_id);
                self.generate_loop_body(body, LoopTarget { break_to: end_id, continue_to: cond_id })?;
                self.jump_if_open(cond_id);

                self.switch_to(end_id);
                Ok(())
            }

            Stmt::For { init, cond, step, body, .. } => {
                match init {
                    Some(ForInit::Var(var)) => self.generate_var_decl(var)?,
                    Some(ForInit::Expr(expr)) => {
                        self.generate_expr(expr)?;
                    }
                    None => {}
                }

                let n = self.next_label();
                let cond_id = self.add_block(&format!("for.{}.cond", n));
                let body_id = self.add_block(&format!("for.{}.body", n));
                let step_id = self.add_block(&format!("for.{}.step", n));
                let end_id = self.add_block(&format!("for.{}.end", n));

                self.set_terminator(Terminator::Jump { target: cond_id });

                self.switch_to(cond_id);
                match cond {
                    Some(cond) => {
                        let cond_val = self.generate_expr(cond)?;
                        self.set_terminator(Terminator::Branch {
                            cond: cond_val,
                            then_target: body_id,
                            else_target: end_id,
                        });
                    }
                    None => self.set_terminator(Terminator::Jump { target: body_id }),
                }

                self.switch_to(body_id);
                self.generate_loop_body(body, LoopTarget { break_to: end_id, continue_to: step_id })?;
                self.jump_if_open(step_id);

                self.switch_to(step_id);
                if let Some(step) = step {
                    self.generate_expr(step)?;
                }
                self.set_terminator(Terminator::Jump { target: cond_id });

                self.switch_to(end_id);
                Ok(())
            }

            Stmt::Return { value, .. } => {
                let ret_val = match value {
                    Some(expr) => Some(self.generate_expr(expr)?),
                    None => None,
                };
                self.set_terminator(Terminator::Return { value: ret_val });
                Ok(())
            }

            Stmt::Break { .. } => {
                let target = self.innermost_loop()?.break_to;
                self.set_terminator(Terminator::Jump { target });
                Ok(())
            }

            Stmt::Continue { .. } => {
                let target = self.innermost_loop()?.continue_to;
                self.set_terminator(Terminator::Jump { target });
                Ok(())
            }

            Stmt::Expr(expr) => {
                self.generate_expr(expr)?;
                Ok(())
            }

            Stmt::Empty { .. } => Ok(()),
        }
    }

    fn generate_loop_body(&mut self, body: &Stmt, target: LoopTarget) -> Result<()> {
        self.loops.push(target);
        let result = self.generate_stmt(body);
        self.loops.pop();
        result
    }

    fn innermost_loop(&self) -> Result<LoopTarget> {
        self.loops
            .last()
            .copied()
            .ok_or_else(|| Error::internal("loop control statement outside of a loop"))
    }

    fn generate_var_decl(&mut self, var: &ast::VarDecl) -> Result<()> {
        for declarator in &var.declarators {
            let id = declarator.symbol.ok_or_else(|| missing_symbol(&declarator.name.name))?;
            let value = match &declarator.init {
                Some(init) => Some(self.generate_expr(init)?),
                None => None,
            };
            self.bind(id, value)?;
        }
        Ok(())
    }

    // ==================== Expressions ====================

    /// Generate IR for an expression
    fn generate_expr(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::IntLit(n) => Ok(Value::Constant(Constant::Int(*n))),
            ExprKind::BoolLit(b) => Ok(Value::Constant(Constant::Bool(*b))),
            ExprKind::StringLit(s) => Ok(Value::Constant(Constant::String(s.clone()))),
            ExprKind::Null => Ok(Value::Constant(Constant::Null)),
            ExprKind::This => Ok(Value::Parameter(0)),

            ExprKind::Ident { name, symbol } => {
                let id = symbol.ok_or_else(|| missing_symbol(name))?;
                if let Some(binding) = self.locals.get(&id).cloned() {
                    return Ok(match binding {
                        Binding::Value(value) => value,
                        Binding::Slot { ptr, ty } => self.load(Value::Register(ptr), ty),
                    });
                }
                let ty = ir_type(expr_type(expr)?)?;
                let ptr = self.variable_address(id)?;
                Ok(self.load(ptr, ty))
            }

            ExprKind::Binary { op: ast::BinOp::And, left, right } => self.generate_logical(true, left, right),
            ExprKind::Binary { op: ast::BinOp::Or, left, right } => self.generate_logical(false, left, right),

            ExprKind::Binary { op, left, right } => {
                let left_ty = expr_type(left)?.clone();
                let left_val = self.generate_expr(left)?;
                let right_val = self.generate_expr(right)?;
                self.binary(*op, &left_ty, left_val, right_val)
            }

            ExprKind::Assign { op, target, value } => {
                let ptr = self.generate_address(target)?;
                match op {
                    None => {
                        let value = self.generate_expr(value)?;
                        self.emit(Instruction::Store { ptr, value });
                        Ok(Value::Unit)
                    }
                    Some(op) => {
                        let target_ty = expr_type(target)?.clone();
                        let old = self.load(ptr.clone(), ir_type(&target_ty)?);
                        let rhs = self.generate_expr(value)?;
                        let new = self.binary(*op, &target_ty, old, rhs)?;
                        self.emit(Instruction::Store { ptr, value: new.clone() });
                        Ok(new)
                    }
                }
            }

            ExprKind::Prefix { op: PrefixOp::Inc | PrefixOp::Dec, .. } => {
                let (_, new) = self.generate_increment(expr)?;
                Ok(new)
            }

            ExprKind::Prefix { op, operand } => {
                let value = self.generate_expr(operand)?;
                let ir_op = match op {
                    PrefixOp::Plus => return Ok(value),
                    PrefixOp::Neg => UnaryOp::Neg,
                    PrefixOp::Not => UnaryOp::Not,
                    PrefixOp::BitNot => UnaryOp::BitNot,
                    PrefixOp::Inc | PrefixOp::Dec => {
                        return Err(Error::internal("increment reached unary lowering"));
                    }
                };
                let dest = self.alloc_register();
                self.emit(Instruction::UnaryOp { dest, op: ir_op, value });
                Ok(Value::Register(dest))
            }

            ExprKind::Suffix { op, operand } => {
                let ptr = self.generate_address(operand)?;
                let old = self.load(ptr.clone(), IRType::I32);
                let new = self.step(old.clone(), *op == SuffixOp::Inc);
                self.emit(Instruction::Store { ptr, value: new });
                Ok(old)
            }

            ExprKind::Ternary { cond, then_expr, else_expr } => {
                let n = self.next_label();
                let cond_val = self.generate_expr(cond)?;
                let then_id = self.add_block(&format!("cond.{}.then", n));
                let else_id = self.add_block(&format!("cond.{}.else", n));
                let end_id = self.add_block(&format!("cond.{}.end", n));
                self.set_terminator(Terminator::Branch { cond: cond_val, then_target: then_id, else_target: else_id });

                self.switch_to(then_id);
                let then_val = self.generate_expr(then_expr)?;
                let then_exit = self.current_block;
                self.set_terminator(Terminator::Jump { target: end_id });

                self.switch_to(else_id);
                let else_val = self.generate_expr(else_expr)?;
                let else_exit = self.current_block;
                self.set_terminator(Terminator::Jump { target: end_id });

                self.switch_to(end_id);
                let ty = expr_type(expr)?;
                if *ty == Type::Void {
                    return Ok(Value::Unit);
                }
                let ty = ir_type(ty)?;
                let dest = self.alloc_register();
                self.emit(Instruction::Phi { dest, ty, incoming: vec![(then_val, then_exit), (else_val, else_exit)] });
                Ok(Value::Register(dest))
            }

            ExprKind::Call { name, args, symbol } => {
                let id = symbol.ok_or_else(|| missing_symbol(&name.name))?;
                let mut arg_vals = Vec::with_capacity(args.len() + 1);
                let func = match self.analysis.symbols.get(id) {
                    Symbol::Function { kind: FunctionKind::Method(class), name, .. } => {
                        arg_vals.push(Value::Parameter(0));
                        method_name(&self.analysis.classes.get(*class).name, name)
                    }
                    Symbol::Function { name, .. } => name.clone(),
                    other => return Err(Error::internal(format!("\"{}\" is not callable", other.name()))),
                };
                for arg in args {
                    arg_vals.push(self.generate_expr(arg)?);
                }
                self.call(func, arg_vals, expr_type(expr)?)
            }

            ExprKind::MethodCall { receiver, method, args, symbol } => {
                let receiver_val = self.generate_expr(receiver)?;
                let func = match expr_type(receiver)? {
                    Type::Array(_) => {
                        let dest = self.alloc_register();
                        self.emit(Instruction::ArrayLength { dest, array: receiver_val });
                        return Ok(Value::Register(dest));
                    }
                    Type::String => string_method_name(&method.name),
                    _ => {
                        let id = symbol.ok_or_else(|| missing_symbol(&method.name))?;
                        match self.analysis.symbols.get(id) {
                            Symbol::Function { kind: FunctionKind::Method(class), name, .. } => {
                                method_name(&self.analysis.classes.get(*class).name, name)
                            }
                            other => {
                                return Err(Error::internal(format!("\"{}\" is not a method", other.name())));
                            }
                        }
                    }
                };
                let mut arg_vals = vec![receiver_val];
                for arg in args {
                    arg_vals.push(self.generate_expr(arg)?);
                }
                self.call(func, arg_vals, expr_type(expr)?)
            }

            ExprKind::Member { .. } | ExprKind::Index { .. } => {
                let ty = ir_type(expr_type(expr)?)?;
                let ptr = self.generate_address(expr)?;
                Ok(self.load(ptr, ty))
            }

            ExprKind::NewObject { class, symbol, args } => {
                let Type::Class { id, name } = expr_type(expr)? else {
                    return Err(Error::internal(format!("\"new\" of non-class type at {}", class.location)));
                };
                let ctor = symbol.ok_or_else(|| missing_symbol(name))?;
                if self.analysis.constructors.get(id) != Some(&ctor) {
                    return Err(Error::internal(format!("constructor of \"{}\" does not match", name)));
                }
                let dest = self.alloc_register();
                self.emit(Instruction::NewObject { dest, class: name.to_string() });
                let mut arg_vals = vec![Value::Register(dest)];
                for arg in args {
                    arg_vals.push(self.generate_expr(arg)?);
                }
                self.emit(Instruction::Call { dest: None, func: constructor_name(name), args: arg_vals });
                Ok(Value::Register(dest))
            }

            ExprKind::NewArray { lengths, .. } => {
                let ty = expr_type(expr)?.clone();
                let lengths = lengths
                    .iter()
                    .map(|length| self.generate_expr(length))
                    .collect::<Result<Vec<_>>>()?;
                self.new_array(&ty, &lengths)
            }
        }
    }

    /// `a && b` / `a || b` with a phi over the short-circuit edge
    fn generate_logical(&mut self, is_and: bool, left: &Expr, right: &Expr) -> Result<Value> {
        let n = self.next_label();
        let prefix = if is_and { "land" } else { "lor" };
        let left_val = self.generate_expr(left)?;
        let left_exit = self.current_block;
        let rhs_id = self.add_block(&format!("{}.{}.rhs", prefix, n));
        let end_id = self.add_block(&format!("{}.{}.end", prefix, n));

        let (then_target, else_target) = if is_and { (rhs_id, end_id) } else { (end_id, rhs_id) };
        self.set_terminator(Terminator::Branch { cond: left_val, then_target, else_target });

        self.switch_to(rhs_id);
        let right_val = self.generate_expr(right)?;
        let right_exit = self.current_block;
        self.set_terminator(Terminator::Jump { target: end_id });

        self.switch_to(end_id);
        let dest = self.alloc_register();
        self.emit(Instruction::Phi {
            dest,
            ty: IRType::Bool,
            incoming: vec![
                (Value::Constant(Constant::Bool(!is_and)), left_exit),
                (right_val, right_exit),
            ],
        });
        Ok(Value::Register(dest))
    }

    /// Prefix `++`/`--`; returns the address and the new value
    fn generate_increment(&mut self, expr: &Expr) -> Result<(Value, Value)> {
        let ExprKind::Prefix { op, operand } = &expr.kind else {
            return Err(Error::internal("expected an increment"));
        };
        let ptr = self.generate_address(operand)?;
        let old = self.load(ptr.clone(), IRType::I32);
        let new = self.step(old, *op == PrefixOp::Inc);
        self.emit(Instruction::Store { ptr: ptr.clone(), value: new.clone() });
        Ok((ptr, new))
    }

    /// Address of an assignable expression
    fn generate_address(&mut self, expr: &Expr) -> Result<Value> {
        match &expr.kind {
            ExprKind::Ident { name, symbol } => {
                let id = symbol.ok_or_else(|| missing_symbol(name))?;
                match self.locals.get(&id) {
                    Some(Binding::Slot { ptr, .. }) => Ok(Value::Register(*ptr)),
                    Some(Binding::Value(_)) => {
                        Err(Error::internal(format!("\"{}\" is assigned but was not flagged as mutated", name)))
                    }
                    None => self.variable_address(id),
                }
            }
            ExprKind::Member { object, field, symbol } => {
                let object_val = self.generate_expr(object)?;
                let id = symbol.ok_or_else(|| missing_symbol(&field.name))?;
                self.field_address(id, object_val)
            }
            ExprKind::Index { array, index } => {
                let elem_ty = ir_type(expr_type(expr)?)?;
                let array_val = self.generate_expr(array)?;
                let index_val = self.generate_expr(index)?;
                let dest = self.alloc_register();
                self.emit(Instruction::GetElementPtr { dest, ptr: array_val, index: index_val, elem_ty });
                Ok(Value::Register(dest))
            }
            ExprKind::Prefix { op: PrefixOp::Inc | PrefixOp::Dec, .. } => {
                let (ptr, _) = self.generate_increment(expr)?;
                Ok(ptr)
            }
            _ => Err(Error::internal(format!("expression at {} is not addressable", expr.location))),
        }
    }

    /// Address of a global or an implicit `this` field
    fn variable_address(&mut self, id: SymbolId) -> Result<Value> {
        let analysis = self.analysis;
        match analysis.symbols.get(id) {
            Symbol::Variable { storage: Storage::Global, name, .. } => Ok(Value::Global(name.clone())),
            Symbol::Variable { storage: Storage::Field { .. }, .. } => self.field_address(id, Value::Parameter(0)),
            other => Err(Error::internal(format!("\"{}\" is used outside of its function", other.name()))),
        }
    }

    fn field_address(&mut self, id: SymbolId, object: Value) -> Result<Value> {
        let analysis = self.analysis;
        let symbol = analysis.symbols.get(id);
        let Symbol::Variable { storage: Storage::Field { class, index }, .. } = symbol else {
            return Err(Error::internal(format!("\"{}\" is not a field", symbol.name())));
        };
        let dest = self.alloc_register();
        self.emit(Instruction::FieldPtr {
            dest,
            object,
            class: analysis.classes.get(*class).name.to_string(),
            index: *index,
        });
        Ok(Value::Register(dest))
    }

    fn binary(&mut self, op: ast::BinOp, operand_ty: &Type, left: Value, right: Value) -> Result<Value> {
        if *operand_ty == Type::String {
            let helper = STRING_HELPERS
                .iter()
                .find(|(candidate, _)| *candidate == op)
                .map(|(_, name)| name.to_string())
                .ok_or_else(|| Error::internal(format!("no string lowering for \"{}\"", op.symbol())))?;
            let ret = if op == ast::BinOp::Add { Type::String } else { Type::Bool };
            return self.call(helper, vec![left, right], &ret);
        }
        let dest = self.alloc_register();
        let op = ast_binop_to_ir(op)?;
        self.emit(Instruction::BinOp { dest, op, left, right });
        Ok(Value::Register(dest))
    }

    fn step(&mut self, value: Value, increment: bool) -> Value {
        let dest = self.alloc_register();
        let op = if increment { IRBinOp::Add } else { IRBinOp::Sub };
        self.emit(Instruction::BinOp { dest, op, left: value, right: Value::Constant(Constant::Int(1)) });
        Value::Register(dest)
    }

    fn call(&mut self, func: String, args: Vec<Value>, ret: &Type) -> Result<Value> {
        if *ret == Type::Void {
            self.emit(Instruction::Call { dest: None, func, args });
            return Ok(Value::Unit);
        }
        ir_type(ret)?;
        let dest = self.alloc_register();
        self.emit(Instruction::Call { dest: Some(dest), func, args });
        Ok(Value::Register(dest))
    }

    /// Allocate the outer array and, for each further given length, fill
    /// every element with a nested array in a loop
    fn new_array(&mut self, ty: &Type, lengths: &[Value]) -> Result<Value> {
        let (Some(length), Some(elem)) = (lengths.first(), ty.element_type()) else {
            return Err(Error::internal("array creation without a length"));
        };
        let elem_ty = ir_type(elem)?;
        let array = self.alloc_register();
        self.emit(Instruction::NewArray { dest: array, elem_ty: elem_ty.clone(), length: length.clone() });
        if lengths.len() == 1 {
            return Ok(Value::Register(array));
        }

        let n = self.next_label();
        let counter = self.alloc_register();
        self.emit_alloca(Instruction::Alloca { dest: counter, ty: IRType::I32 });
        self.emit(Instruction::Store { ptr: Value::Register(counter), value: Value::Constant(Constant::Int(0)) });
        let cond_id = self.add_block(&format!("new.{}.cond", n));
        let body_id = self.add_block(&format!("new.{}.body", n));
        let end_id = self.add_block(&format!("new.{}.end", n));
        self.set_terminator(Terminator::Jump { target: cond_id });

        self.switch_to(cond_id);
        let index = self.load(Value::Register(counter), IRType::I32);
        let more = self.alloc_register();
        self.emit(Instruction::BinOp { dest: more, op: IRBinOp::Lt, left: index.clone(), right: length.clone() });
        self.set_terminator(Terminator::Branch { cond: Value::Register(more), then_target: body_id, else_target: end_id });

        self.switch_to(body_id);
        let inner = self.new_array(elem, &lengths[1..])?;
        let slot = self.alloc_register();
        self.emit(Instruction::GetElementPtr { dest: slot, ptr: Value::Register(array), index: index.clone(), elem_ty });
        self.emit(Instruction::Store { ptr: Value::Register(slot), value: inner });
        let next = self.step(index, true);
        self.emit(Instruction::Store { ptr: Value::Register(counter), value: next });
        self.set_terminator(Terminator::Jump { target: cond_id });

        self.switch_to(end_id);
        Ok(Value::Register(array))
    }

    // ==================== Helper Methods ====================

    fn symbol(&self, id: Option<SymbolId>) -> Result<&'a Symbol> {
        let analysis: &'a Analysis = self.analysis;
        id.map(|id| analysis.symbols.get(id))
            .ok_or_else(|| Error::internal("declaration without a resolved symbol"))
    }

    fn class_pointer(&self, class: ClassId) -> IRType {
        IRType::ptr_to(IRType::Struct(self.analysis.classes.get(class).name.to_string()))
    }

    fn alloc_register(&mut self) -> Register {
        let reg = Register(self.next_register);
        self.next_register += 1;
        reg
    }

    fn next_label(&mut self) -> usize {
        let n = self.next_label;
        self.next_label += 1;
        n
    }

    fn add_block(&mut self, label: &str) -> BlockId {
        self.func.add_block(label)
    }

    fn switch_to(&mut self, block: BlockId) {
        self.current_block = block;
    }

    fn emit(&mut self, inst: Instruction) {
        if let Some(block) = self.func.get_block_mut(self.current_block) {
            block.push(inst);
        }
    }

    /// Allocas go to the top of the entry block
    fn emit_alloca(&mut self, inst: Instruction) {
        let position = self.allocas;
        if let Some(entry) = self.func.get_block_mut(self.func.entry_block) {
            entry.instructions.insert(position, inst);
            self.allocas += 1;
        }
    }

    fn load(&mut self, ptr: Value, ty: IRType) -> Value {
        let dest = self.alloc_register();
        self.emit(Instruction::Load { dest, ptr, ty });
        Value::Register(dest)
    }

    fn set_terminator(&mut self, term: Terminator) {
        if let Some(block) = self.func.get_block_mut(self.current_block) {
            block.set_terminator(term);
        }
    }

    fn is_terminated(&self) -> bool {
        self.func.block(self.current_block).map_or(true, |block| block.is_terminated())
    }

    fn jump_if_open(&mut self, target: BlockId) {
        if !self.is_terminated() {
            self.set_terminator(Terminator::Jump { target });
        }
    }
}

fn missing_symbol(name: &str) -> Error {
    Error::internal(format!("\"{}\" reached lowering unresolved", name))
}

/// Type annotation of an analyzed expression
fn expr_type(expr: &Expr) -> Result<&Type> {
    match &expr.ty {
        Some(ty) if !ty.contains_unknown() => Ok(ty),
        Some(_) => Err(Error::internal(format!("unknown type reached lowering at {}", expr.location))),
        None => Err(Error::internal(format!("unannotated expression at {}", expr.location))),
    }
}

fn ir_type(ty: &Type) -> Result<IRType> {
    Ok(match ty {
        Type::Int => IRType::I32,
        Type::Bool => IRType::Bool,
        Type::String | Type::Null => IRType::ptr_to(IRType::I8),
        Type::Void => IRType::Void,
        Type::Class { name, .. } => IRType::ptr_to(IRType::Struct(name.to_string())),
        Type::Array(elem) => IRType::ptr_to(ir_type(elem)?),
        Type::Function { .. } => return Err(Error::internal("function type used as a value")),
        Type::Unknown => return Err(Error::internal("unknown type reached lowering")),
    })
}

/// Value of a variable that was never assigned, and of a missing return
fn default_value(ty: &Type) -> Option<Value> {
    match ty {
        Type::Void => None,
        Type::Int => Some(Value::Constant(Constant::Int(0))),
        Type::Bool => Some(Value::Constant(Constant::Bool(false))),
        _ => Some(Value::Constant(Constant::Null)),
    }
}

/// Initializer usable directly as global data
fn constant_of(expr: &Expr) -> Option<Constant> {
    match &expr.kind {
        ExprKind::IntLit(n) => Some(Constant::Int(*n)),
        ExprKind::BoolLit(b) => Some(Constant::Bool(*b)),
        ExprKind::StringLit(s) => Some(Constant::String(s.clone())),
        ExprKind::Null => Some(Constant::Null),
        ExprKind::Prefix { op: PrefixOp::Neg, operand } => match operand.kind {
            ExprKind::IntLit(n) => Some(Constant::Int(-n)),
            _ => None,
        },
        _ => None,
    }
}

fn ast_binop_to_ir(op: ast::BinOp) -> Result<IRBinOp> {
    Ok(match op {
        ast::BinOp::Add => IRBinOp::Add,
        ast::BinOp::Sub => IRBinOp::Sub,
        ast::BinOp::Mul => IRBinOp::Mul,
        ast::BinOp::Div => IRBinOp::Div,
        ast::BinOp::Mod => IRBinOp::Mod,
        ast::BinOp::Eq => IRBinOp::Eq,
        ast::BinOp::Ne => IRBinOp::Ne,
        ast::BinOp::Lt => IRBinOp::Lt,
        ast::BinOp::Le => IRBinOp::Le,
        ast::BinOp::Gt => IRBinOp::Gt,
        ast::BinOp::Ge => IRBinOp::Ge,
        ast::BinOp::BitAnd => IRBinOp::And,
        ast::BinOp::BitOr => IRBinOp::Or,
        ast::BinOp::BitXor => IRBinOp::Xor,
        ast::BinOp::Shl => IRBinOp::Shl,
        ast::BinOp::Shr => IRBinOp::Shr,
        ast::BinOp::UShr => IRBinOp::UShr,
        ast::BinOp::And | ast::BinOp::Or => {
            return Err(Error::internal("short-circuit operator reached arithmetic lowering"));
        }
    })
}

/// Lower an analyzed program into an IR module named `module_name`
pub fn lower(module_name: &str, program: &Program, analysis: &Analysis) -> Result<IRModule> {
    IRGenerator::new(module_name, analysis).generate(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::ErrorRecorder;
    use crate::frontend::parser::parse_source;
    use crate::frontend::semantic::analyze;
    use pretty_assertions::assert_eq;

    fn generate(source: &str) -> Result<IRModule> {
        let mut recorder = ErrorRecorder::new("test.mx");
        let mut program = parse_source(source, &mut recorder);
        let analysis = analyze(&mut program, &mut recorder);
        assert_eq!(recorder.total_errors(), 0, "{}", recorder.render());
        lower("test", &program, &analysis)
    }

    fn function<'m>(module: &'m IRModule, name: &str) -> &'m IRFunction {
        module.function(name).unwrap_or_else(|| panic!("missing function {}", name))
    }

    fn labels(func: &IRFunction) -> Vec<&str> {
        func.blocks.iter().map(|b| b.label.as_str()).collect()
    }

    #[test]
    fn test_empty_main() {
        let module = generate("int main() {}").unwrap();
        let main = function(&module, "main");
        assert_eq!(main.blocks.len(), 1);
        assert!(matches!(
            main.blocks[0].terminator,
            Some(Terminator::Return { value: Some(Value::Constant(Constant::Int(0))) })
        ));
    }

    #[test]
    fn test_straight_line_instruction_count() {
        // Four operators/calls: *, +, g(), -
        let module = generate(
            "int g(int x) { return x; }\n\
             int f(int a, int b) { int c = a * b + 1; return c - g(a); }\n\
             int main() { return 0; }",
        )
        .unwrap();
        let f = function(&module, "f");
        assert_eq!(f.blocks.len(), 1);
        assert_eq!(f.blocks[0].instructions.len(), 4);
        assert!(f.blocks[0].terminator.is_some());
    }

    #[test]
    fn test_every_block_has_one_terminator() {
        let module = generate(
            "int main() {\n\
               int s = 0;\n\
               for (int i = 0; i < 10; i++) { if (i % 2 == 0) continue; s += i; if (s > 20) break; }\n\
               while (s > 0) s--;\n\
               bool b = s == 0 && s < 1 || false;\n\
               return b ? 1 : 0;\n\
             }",
        )
        .unwrap();
        for func in &module.functions {
            for block in &func.blocks {
                assert!(block.terminator.is_some(), "{}:{} is open", func.name, block.label);
            }
        }
    }

    #[test]
    fn test_if_labels_and_merge() {
        let module = generate("int main() { int x = getInt(); if (x > 0) printInt(x); else printInt(0); return x; }").unwrap();
        let main = function(&module, "main");
        assert_eq!(labels(main), vec!["entry", "if.0.then", "if.0.else", "if.0.end"]);
        assert!(matches!(main.blocks[3].terminator, Some(Terminator::Return { .. })));
    }

    #[test]
    fn test_loop_targets() {
        let module = generate(
            "int main() { for (int i = 0; i < 3; ++i) { if (i == 1) continue; break; } \
             while (true) { break; } return 0; }",
        )
        .unwrap();
        let main = function(&module, "main");
        assert_eq!(
            labels(main),
            vec![
                "entry", "for.0.cond", "for.0.body", "for.0.step", "for.0.end", "if.1.then", "if.1.end",
                "while.2.cond", "while.2.body", "while.2.end",
            ]
        );
        let target = |label: &str| match &main.block_by_label(label).and_then(|b| b.terminator.clone()) {
            Some(Terminator::Jump { target }) => main.blocks[target.0].label.clone(),
            other => panic!("unexpected terminator {:?}", other),
        };
        // continue goes to the step, break to the loop end
        assert_eq!(target("if.1.then"), "for.0.step");
        assert_eq!(target("if.1.end"), "for.0.end");
        assert_eq!(target("while.2.body"), "while.2.end");
    }

    #[test]
    fn test_code_after_return_is_dropped() {
        let module = generate("int main() { return 1; printInt(2); int y = 3 + 4; }").unwrap();
        let main = function(&module, "main");
        assert_eq!(main.blocks.len(), 1);
        assert!(main.blocks[0].instructions.is_empty());
        assert!(matches!(
            main.blocks[0].terminator,
            Some(Terminator::Return { value: Some(Value::Constant(Constant::Int(1))) })
        ));
    }

    #[test]
    fn test_unreachable_merge_block_is_terminated() {
        let module = generate("int f(bool c) { if (c) return 1; else return 2; } int main() { return f(true); }").unwrap();
        let f = function(&module, "f");
        let end = f.block_by_label("if.0.end").expect("merge block");
        assert!(matches!(
            end.terminator,
            Some(Terminator::Return { value: Some(Value::Constant(Constant::Int(0))) })
        ));
    }

    #[test]
    fn test_short_circuit_phi() {
        let module = generate("bool f(bool a, bool b) { return a && b; } int main() { return 0; }").unwrap();
        let f = function(&module, "f");
        assert_eq!(labels(f), vec!["entry", "land.0.rhs", "land.0.end"]);
        let Some(Instruction::Phi { incoming, .. }) = f.blocks[2].instructions.first() else {
            panic!("expected phi");
        };
        assert_eq!(
            incoming.clone(),
            vec![
                (Value::Constant(Constant::Bool(false)), BlockId(0)),
                (Value::Parameter(1), BlockId(1)),
            ]
        );
    }

    #[test]
    fn test_mutated_locals_use_slots() {
        let module = generate("int main() { int a = 1; int b = 2; b = a + b; return b; }").unwrap();
        let main = function(&module, "main");
        let insts = &main.blocks[0].instructions;
        assert!(matches!(insts[0], Instruction::Alloca { ty: IRType::I32, .. }));
        let allocas = insts.iter().filter(|i| matches!(i, Instruction::Alloca { .. })).count();
        assert_eq!(allocas, 1);
    }

    #[test]
    fn test_classes_methods_and_fields() {
        let module = generate(
            "class Counter {\n\
               int n;\n\
               Counter() { n = 0; }\n\
               void add(int k) { n += k; }\n\
               int get() { return n; }\n\
             };\n\
             int main() { Counter c = new Counter(); c.add(2); return c.get(); }",
        )
        .unwrap();
        assert_eq!(module.structs[0].name, "Counter");
        assert_eq!(module.structs[0].fields, vec![("n".to_string(), IRType::I32)]);
        let add = function(&module, "Counter.add");
        assert_eq!(add.params[0].0, "this");
        assert!(matches!(
            add.blocks[0].instructions[0],
            Instruction::FieldPtr { object: Value::Parameter(0), index: 0, .. }
        ));
        assert!(module.function("Counter.new").is_some());

        let main = function(&module, "main");
        let calls: Vec<&str> = main.blocks[0]
            .instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Call { func, .. } => Some(func.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec!["Counter.new", "Counter.add", "Counter.get"]);
    }

    #[test]
    fn test_default_constructor_generated() {
        let module = generate("class A { int x; }; int main() { A a = new A; return a.x; }").unwrap();
        let ctor = function(&module, "A.new");
        assert_eq!(ctor.blocks.len(), 1);
        assert!(ctor.blocks[0].instructions.is_empty());
    }

    #[test]
    fn test_strings_use_runtime_helpers() {
        let module = generate("int main() { string s = \"a\" + toString(1); if (s < \"b\") println(s); return 0; }").unwrap();
        let main = function(&module, "main");
        let calls: Vec<&str> = main
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .filter_map(|i| match i {
                Instruction::Call { func, .. } => Some(func.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(calls, vec!["toString", "string.concat", "string.lt", "println"]);
    }

    #[test]
    fn test_globals_and_init() {
        let module = generate("int a = 3; int b = a * 2; string s; int main() { return b; }").unwrap();
        assert_eq!(module.globals[0].init, Some(Constant::Int(3)));
        assert_eq!(module.globals[1].init, None);
        assert_eq!(module.globals[2].init, None);
        assert_eq!(module.globals[3].name, INIT_GUARD);
        assert_eq!(module.globals[3].init, Some(Constant::Bool(false)));
        let init = function(&module, INIT_FUNCTION);
        assert!(matches!(
            init.blocks[0].instructions.last(),
            Some(Instruction::Store { ptr: Value::Global(name), .. }) if name == "b"
        ));
    }

    #[test]
    fn test_init_runs_on_first_entry_only() {
        let module = generate("int n = getInt(); int main() { if (n > 0) { n--; return main(); } return 0; }").unwrap();
        let main = function(&module, "main");
        assert_eq!(
            labels(main),
            vec!["entry", "init.0.run", "init.0.end", "if.1.then", "if.1.end"]
        );
        assert!(matches!(
            &main.blocks[0].instructions[0],
            Instruction::Load { ptr: Value::Global(name), ty: IRType::Bool, .. } if name == INIT_GUARD
        ));
        let init_calls = main
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .filter(|i| matches!(i, Instruction::Call { func, .. } if func == INIT_FUNCTION))
            .count();
        assert_eq!(init_calls, 1);
        assert!(matches!(
            main.blocks[1].instructions[..],
            [Instruction::Store { .. }, Instruction::Call { .. }]
        ));
    }

    #[test]
    fn test_method_named_like_its_class() {
        let module = generate("class A { int A() { return 1; } }; int main() { A a = new A; return a.A(); }").unwrap();
        let names: Vec<(&str, String)> = module
            .functions
            .iter()
            .map(|f| (f.name.as_str(), f.ret_type.to_string()))
            .collect();
        assert_eq!(
            names,
            vec![("A.A", "i32".to_string()), ("A.new", "void".to_string()), ("main", "i32".to_string())]
        );
    }

    #[test]
    fn test_user_function_named_like_runtime_helper() {
        let module = generate("int a = getInt(); void __init() {} int main() { __init(); return a; }").unwrap();
        let names: Vec<&str> = module.functions.iter().map(|f| f.name.as_str()).collect();
        assert_eq!(names, vec![INIT_FUNCTION, "__init", "main"]);
    }

    #[test]
    fn test_string_methods_call_runtime() {
        let module = generate(
            "int main() { string s = getString(); return s.length() + s.substring(0, 1).parseInt() + s.ord(0); }",
        )
        .unwrap();
        assert!(module.externs.iter().any(|e| e.name == "string.substring"
            && e.params == vec![IRType::ptr_to(IRType::I8), IRType::I32, IRType::I32]));
        let main = function(&module, "main");
        let calls: Vec<(&str, usize)> = main.blocks[0]
            .instructions
            .iter()
            .filter_map(|i| match i {
                Instruction::Call { func, args, .. } => Some((func.as_str(), args.len())),
                _ => None,
            })
            .collect();
        assert_eq!(
            calls,
            vec![
                ("getString", 0),
                ("string.length", 1),
                ("string.substring", 3),
                ("string.parseInt", 1),
                ("string.ord", 2),
            ]
        );
    }

    #[test]
    fn test_multi_dimensional_new_uses_a_loop() {
        let module = generate("int main() { int[][] g = new int[2][3]; return g[1].size(); }").unwrap();
        let main = function(&module, "main");
        assert_eq!(labels(main), vec!["entry", "new.0.cond", "new.0.body", "new.0.end"]);
        let arrays = main
            .blocks
            .iter()
            .flat_map(|b| &b.instructions)
            .filter(|i| matches!(i, Instruction::NewArray { .. }))
            .count();
        assert_eq!(arrays, 2);
    }

    #[test]
    fn test_unknown_type_is_internal_error() {
        let mut recorder = ErrorRecorder::new("test.mx");
        let mut program = parse_source("int main() { return x; }", &mut recorder);
        let analysis = analyze(&mut program, &mut recorder);
        assert_eq!(recorder.total_errors(), 1);
        let err = lower("test", &program, &analysis).unwrap_err();
        assert!(matches!(err, Error::Internal(_)));
        assert_eq!(err.exit_code(), 3);
    }
}
