//! Semantic Analysis for MxLang
//!
//! Performs:
//! - Declaration collection (classes, built-ins, functions, class members)
//! - Name resolution against the scoped symbol table
//! - Type checking and annotation of every expression
//!
//! Every problem is recorded once in the `Semantic` phase and the offending
//! node is typed `Unknown`; the traversal always runs to completion.

use std::collections::HashMap;

use crate::diagnostics::{ErrorRecorder, Phase};
use crate::frontend::ast::*;
use crate::frontend::symbols::{FunctionKind, ScopeId, Storage, Symbol, SymbolId, SymbolTable};
use crate::types::{ClassId, ClassTable, MemberKind, Type};
use crate::utils::{EntityKind, Location, LookupError};

/// Built-in functions: name, parameters, return type
const BUILTINS: &[(&str, &[Type], Type)] = &[
    ("print", &[Type::String], Type::Void),
    ("println", &[Type::String], Type::Void),
    ("printInt", &[Type::Int], Type::Void),
    ("printlnInt", &[Type::Int], Type::Void),
    ("getString", &[], Type::String),
    ("getInt", &[], Type::Int),
    ("toString", &[Type::Int], Type::String),
];

/// Result of a completed analysis, consumed by lowering
#[derive(Debug)]
pub struct Analysis {
    pub symbols: SymbolTable,
    pub classes: ClassTable,
    /// Constructor symbol of every class, declared or implicit
    pub constructors: HashMap<ClassId, SymbolId>,
}

// ==================== Semantic Analyzer ====================

/// Semantic analyzer
pub struct SemanticAnalyzer<'r> {
    symbols: SymbolTable,
    classes: ClassTable,
    recorder: &'r mut ErrorRecorder,
    constructors: HashMap<ClassId, SymbolId>,
    class_scopes: HashMap<ClassId, ScopeId>,
    /// Class ids in class declaration order; `None` for a rejected duplicate
    class_order: Vec<Option<ClassId>>,
    /// Class whose members are being checked
    current_class: Option<ClassId>,
    /// Return type of the function being checked
    return_type: Type,
    loop_depth: usize,
}

impl<'r> SemanticAnalyzer<'r> {
    pub fn new(recorder: &'r mut ErrorRecorder) -> Self {
        Self {
            symbols: SymbolTable::new(),
            classes: ClassTable::new(),
            recorder,
            constructors: HashMap::new(),
            class_scopes: HashMap::new(),
            class_order: Vec::new(),
            current_class: None,
            return_type: Type::Void,
            loop_depth: 0,
        }
    }

    /// Analyze a program, annotating it in place
    pub fn analyze(mut self, program: &mut Program) -> Analysis {
        // Pass 1: every name that may be referenced before its definition
        self.declare_classes(program);
        self.register_builtins();
        self.declare_functions(program);
        self.declare_class_members(program);
        log::debug!(
            "declared {} classes and {} symbols",
            self.classes.iter().count(),
            self.symbols.len()
        );

        // Pass 2: bodies and globals, in source order
        self.check_program(program);
        self.check_main(program);

        Analysis {
            symbols: self.symbols,
            classes: self.classes,
            constructors: self.constructors,
        }
    }

    fn error(&mut self, location: Location, message: impl Into<String>) {
        self.recorder.record(Phase::Semantic, location, message);
    }

    fn lookup_error(&mut self, location: Location, err: LookupError) {
        self.error(location, err.to_string());
    }

    /// Run `f` inside a fresh scope; the scope is closed on every path out
    fn scoped<T>(&mut self, f: impl FnOnce(&mut Self) -> T) -> T {
        self.symbols.enter_scope();
        let result = f(self);
        self.symbols.exit_scope();
        result
    }

    /// Run `f` inside the member scope of `class`
    fn in_class<T>(&mut self, class: ClassId, f: impl FnOnce(&mut Self) -> T) -> T {
        let outer = self.current_class.replace(class);
        let scope = self.class_scopes.get(&class).copied();
        if let Some(scope) = scope {
            self.symbols.reenter_scope(scope);
        }
        let result = f(self);
        if scope.is_some() {
            self.symbols.exit_scope();
        }
        self.current_class = outer;
        result
    }

    // ==================== Declarations ====================

    fn declare_classes(&mut self, program: &Program) {
        for decl in &program.decls {
            let Decl::Class(class) = decl else { continue };
            let name = &class.name;
            let id = match self.classes.declare(&name.name) {
                Ok(id) => id,
                Err(err) => {
                    self.lookup_error(name.location, err);
                    self.class_order.push(None);
                    continue;
                }
            };
            let symbol = Symbol::Class {
                name: name.name.clone(),
                ty: self.classes.get(id).ty(),
                site: name.location,
            };
            if let Err(err) = self.symbols.declare(symbol) {
                self.lookup_error(name.location, err);
            }
            self.class_order.push(Some(id));
        }
    }

    fn register_builtins(&mut self) {
        for (name, params, ret) in BUILTINS {
            let symbol = Symbol::Function {
                name: name.to_string(),
                signature: Type::function(ret.clone(), params.to_vec()),
                site: Location::builtin(),
                kind: FunctionKind::Builtin,
            };
            if self.symbols.declare(symbol).is_err() {
                log::debug!("built-in \"{}\" hidden by a class of the same name", name);
            }
        }
    }

    fn declare_functions(&mut self, program: &mut Program) {
        for decl in &mut program.decls {
            if let Decl::Function(func) = decl {
                self.declare_function(func, FunctionKind::Free);
            }
        }
    }

    /// Signature of a function, method or constructor
    fn signature(&mut self, func: &FunctionDecl) -> Type {
        let ret = match &func.ret_type {
            Some(ty) => self.resolve_type(ty),
            None => Type::Void,
        };
        let params = func
            .params
            .iter()
            .map(|param| self.resolve_value_type(&param.ty, "parameter"))
            .collect();
        Type::function(ret, params)
    }

    fn declare_function(&mut self, func: &mut FunctionDecl, kind: FunctionKind) {
        let signature = self.signature(func);
        if let FunctionKind::Method(class) = kind {
            if let Err(err) = self.classes.get_mut(class).add_method(&func.name.name, signature.clone()) {
                self.lookup_error(func.name.location, err);
                return;
            }
        }
        let symbol = Symbol::Function {
            name: func.name.name.clone(),
            signature,
            site: func.name.location,
            kind,
        };
        match self.symbols.declare(symbol) {
            Ok(id) => func.symbol = Some(id),
            Err(err) => self.lookup_error(func.name.location, err),
        }
    }

    fn declare_class_members(&mut self, program: &mut Program) {
        let classes = program.decls.iter_mut().filter_map(|decl| match decl {
            Decl::Class(class) => Some(class),
            _ => None,
        });
        let order = self.class_order.clone();
        for (class, id) in classes.zip(order) {
            let Some(id) = id else { continue };
            let scope = self.symbols.enter_scope();
            self.class_scopes.insert(id, scope);

            for field in &mut class.fields {
                self.declare_field(id, field);
            }
            for method in &mut class.methods {
                self.declare_function(method, FunctionKind::Method(id));
            }
            self.declare_constructor(id, class);

            self.symbols.exit_scope();
        }
    }

    fn declare_field(&mut self, class: ClassId, field: &mut VarDecl) {
        let ty = self.resolve_value_type(&field.ty, "field");
        for declarator in &mut field.declarators {
            let name = &declarator.name;
            let index = match self.classes.get_mut(class).add_field(&name.name, ty.clone()) {
                Ok(index) => index,
                Err(err) => {
                    self.lookup_error(name.location, err);
                    continue;
                }
            };
            let symbol = Symbol::Variable {
                name: name.name.clone(),
                ty: ty.clone(),
                site: name.location,
                storage: Storage::Field { class, index },
                mutated: false,
            };
            match self.symbols.declare(symbol) {
                Ok(id) => declarator.symbol = Some(id),
                Err(err) => self.lookup_error(name.location, err),
            }
        }
    }

    /// Constructors are reachable only through `new`, never by name lookup
    fn declare_constructor(&mut self, class: ClassId, decl: &mut ClassDecl) {
        let class_name = decl.name.name.clone();
        for (i, ctor) in decl.constructors.iter_mut().enumerate() {
            if i > 0 {
                self.lookup_error(
                    ctor.name.location,
                    LookupError::Duplicated { name: class_name.clone(), kind: EntityKind::Function },
                );
                continue;
            }
            let signature = self.signature(ctor);
            let id = self.symbols.declare_detached(Symbol::Function {
                name: class_name.clone(),
                signature: signature.clone(),
                site: ctor.name.location,
                kind: FunctionKind::Constructor(class),
            });
            ctor.symbol = Some(id);
            self.classes.get_mut(class).constructor = Some(signature);
            self.constructors.insert(class, id);
        }

        if decl.constructors.is_empty() {
            let signature = Type::function(Type::Void, Vec::new());
            let id = self.symbols.declare_detached(Symbol::Function {
                name: class_name,
                signature: signature.clone(),
                site: decl.name.location,
                kind: FunctionKind::Constructor(class),
            });
            self.classes.get_mut(class).constructor = Some(signature);
            self.constructors.insert(class, id);
        }
    }

    /// Resolve a written type; unknown class names yield `Unknown`
    fn resolve_type(&mut self, node: &TypeNode) -> Type {
        let base = match &node.base {
            BaseType::Int => Type::Int,
            BaseType::Bool => Type::Bool,
            BaseType::String => Type::String,
            BaseType::Void if node.dims > 0 => {
                self.error(node.location, "array element type cannot be \"void\"");
                return Type::Unknown;
            }
            BaseType::Void => Type::Void,
            BaseType::Named(name) => match self.classes.lookup(name) {
                Some(id) => self.classes.get(id).ty(),
                None => {
                    let err = LookupError::NotFound { name: name.clone(), kind: EntityKind::Class };
                    self.lookup_error(node.location, err);
                    return Type::Unknown;
                }
            },
        };
        Type::array_with_dims(base, node.dims)
    }

    /// Resolve the type of something that holds a value
    fn resolve_value_type(&mut self, node: &TypeNode, what: &str) -> Type {
        match self.resolve_type(node) {
            Type::Void => {
                self.error(node.location, format!("cannot declare {} of void type", what));
                Type::Unknown
            }
            ty => ty,
        }
    }

    // ==================== Bodies ====================

    fn check_program(&mut self, program: &mut Program) {
        let mut class_index = 0;
        for decl in &mut program.decls {
            match decl {
                Decl::Variable(var) => self.check_var_decl(var, Storage::Global),
                Decl::Function(func) => self.check_function(func),
                Decl::Class(class) => {
                    let id = self.class_order.get(class_index).copied().flatten();
                    class_index += 1;
                    let Some(id) = id else { continue };
                    self.in_class(id, |this| {
                        for method in &mut class.methods {
                            this.check_function(method);
                        }
                        for ctor in &mut class.constructors {
                            this.check_function(ctor);
                        }
                    });
                }
            }
        }
    }

    fn check_function(&mut self, func: &mut FunctionDecl) {
        let signature = match func.symbol {
            Some(id) => self.symbols.get(id).ty().clone(),
            // Rejected duplicate: check the body against its own signature
            None => self.signature(func),
        };
        let (ret, params) = match signature {
            Type::Function { ret, params } => (*ret, params),
            _ => (Type::Void, Vec::new()),
        };
        log::trace!("checking function {}", func.name.name);

        let outer_return = std::mem::replace(&mut self.return_type, ret);
        let outer_loops = std::mem::replace(&mut self.loop_depth, 0);
        self.scoped(|this| {
            for (index, (param, ty)) in func.params.iter_mut().zip(params).enumerate() {
                let symbol = Symbol::Variable {
                    name: param.name.name.clone(),
                    ty,
                    site: param.name.location,
                    storage: Storage::Parameter(index),
                    mutated: false,
                };
                match this.symbols.declare(symbol) {
                    Ok(id) => param.symbol = Some(id),
                    Err(err) => this.lookup_error(param.name.location, err),
                }
            }
            this.check_stmts(&mut func.body.stmts);
        });
        self.return_type = outer_return;
        self.loop_depth = outer_loops;
    }

    fn check_stmts(&mut self, stmts: &mut [Stmt]) {
        let mut terminated = false;
        let mut warned = false;
        for stmt in stmts {
            if terminated && !warned && !matches!(stmt, Stmt::Empty { .. }) {
                self.recorder.warn(Phase::Semantic, stmt_location(stmt), "unreachable statement");
                warned = true;
            }
            self.check_stmt(stmt);
            if matches!(stmt, Stmt::Return { .. } | Stmt::Break { .. } | Stmt::Continue { .. }) {
                terminated = true;
            }
        }
    }

    /// A statement in branch or loop-body position gets its own scope
    fn check_nested(&mut self, stmt: &mut Stmt) {
        self.scoped(|this| this.check_stmt(stmt));
    }

    fn check_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Block(block) => self.scoped(|this| this.check_stmts(&mut block.stmts)),
            Stmt::Var(var) => self.check_var_decl(var, Storage::Local),
            Stmt::If { cond, then_branch, else_branch, .. } => {
                self.check_condition(cond);
                self.check_nested(then_branch);
                if let Some(else_branch) = else_branch {
                    self.check_nested(else_branch);
                }
            }
            Stmt::While { cond, body, .. } => {
                self.check_condition(cond);
                self.check_loop_body(body);
            }
            Stmt::For { init, cond, step, body, .. } => self.scoped(|this| {
                match init {
                    Some(ForInit::Var(var)) => this.check_var_decl(var, Storage::Local),
                    Some(ForInit::Expr(expr)) => {
                        this.check_expr(expr);
                    }
                    None => {}
                }
                if let Some(cond) = cond {
                    this.check_condition(cond);
                }
                if let Some(step) = step {
                    this.check_expr(step);
                }
                this.check_loop_body(body);
            }),
            Stmt::Return { value, location } => self.check_return(value.as_mut(), *location),
            Stmt::Break { location } => self.check_in_loop("break", *location),
            Stmt::Continue { location } => self.check_in_loop("continue", *location),
            Stmt::Expr(expr) => {
                self.check_expr(expr);
            }
            Stmt::Empty { .. } => {}
        }
    }

    fn check_loop_body(&mut self, body: &mut Stmt) {
        self.loop_depth += 1;
        self.check_nested(body);
        self.loop_depth -= 1;
    }

    fn check_in_loop(&mut self, keyword: &str, location: Location) {
        if self.loop_depth == 0 {
            self.error(location, format!("\"{}\" found without loop", keyword));
        }
    }

    fn check_return(&mut self, value: Option<&mut Expr>, location: Location) {
        let expected = self.return_type.clone();
        match value {
            Some(expr) => {
                let found = self.check_expr(expr);
                if expected == Type::Void {
                    self.error(expr.location, "cannot return a value from a void function");
                } else if !expected.is_assignable_from(&found) {
                    self.error(
                        expr.location,
                        format!("cannot return \"{}\" from a function returning \"{}\"", found, expected),
                    );
                }
            }
            None => {
                if expected != Type::Void && !expected.is_unknown() {
                    self.error(location, format!("missing return value of type \"{}\"", expected));
                }
            }
        }
    }

    fn check_condition(&mut self, cond: &mut Expr) {
        let ty = self.check_expr(cond);
        if ty != Type::Bool && !ty.is_unknown() {
            self.error(
                cond.location,
                format!("condition must have type \"bool\", but \"{}\" found", ty),
            );
        }
    }

    fn check_var_decl(&mut self, var: &mut VarDecl, storage: Storage) {
        let ty = self.resolve_value_type(&var.ty, "variable");
        for declarator in &mut var.declarators {
            // The initializer cannot see the variable it initializes
            if let Some(init) = &mut declarator.init {
                let found = self.check_expr(init);
                if !ty.is_assignable_from(&found) {
                    self.error(
                        init.location,
                        format!(
                            "cannot initialize \"{}\" of type \"{}\" with \"{}\"",
                            declarator.name.name, ty, found
                        ),
                    );
                }
            }
            let symbol = Symbol::Variable {
                name: declarator.name.name.clone(),
                ty: ty.clone(),
                site: declarator.name.location,
                storage,
                mutated: false,
            };
            match self.symbols.declare(symbol) {
                Ok(id) => declarator.symbol = Some(id),
                Err(err) => self.lookup_error(declarator.name.location, err),
            }
        }
    }

    /// `int main()` must exist
    fn check_main(&mut self, program: &Program) {
        let found = self
            .symbols
            .lookup_in(self.symbols.global_scope(), "main", EntityKind::Function)
            .map(|id| self.symbols.get(id));
        let valid = matches!(
            found,
            Some(Symbol::Function { signature: Type::Function { ret, params }, kind: FunctionKind::Free, .. })
                if **ret == Type::Int && params.is_empty()
        );
        if !valid {
            let location = program
                .decls
                .iter()
                .find_map(|decl| match decl {
                    Decl::Function(func) if func.name.name == "main" => Some(func.name.location),
                    _ => None,
                })
                .unwrap_or(Location::new(1, 1));
            self.error(location, "cannot find function \"main()\"");
        }
    }

    // ==================== Expressions ====================

    /// Type an expression and record the type on the node
    fn check_expr(&mut self, expr: &mut Expr) -> Type {
        let ty = self.infer(expr);
        expr.ty = Some(ty.clone());
        ty
    }

    fn infer(&mut self, expr: &mut Expr) -> Type {
        let location = expr.location;
        match &mut expr.kind {
            ExprKind::IntLit(_) => Type::Int,
            ExprKind::BoolLit(_) => Type::Bool,
            ExprKind::StringLit(_) => Type::String,
            ExprKind::Null => Type::Null,
            ExprKind::This => match self.current_class {
                Some(id) => self.classes.get(id).ty(),
                None => {
                    self.error(location, "\"this\" used outside of a class");
                    Type::Unknown
                }
            },
            ExprKind::Ident { name, symbol } => match self.symbols.resolve(name, EntityKind::Variable) {
                Ok(id) => {
                    *symbol = Some(id);
                    self.symbols.get(id).ty().clone()
                }
                Err(err) => {
                    self.lookup_error(location, err);
                    Type::Unknown
                }
            },
            ExprKind::Binary { op, left, right } => {
                let left = self.check_expr(left);
                let right = self.check_expr(right);
                self.binary_type(*op, &left, &right, location)
            }
            ExprKind::Assign { op, target, value } => {
                let target_ty = self.check_expr(target);
                let value_ty = self.check_expr(value);
                if !self.require_lvalue(target) {
                    return Type::Unknown;
                }
                match op {
                    None => {
                        if !target_ty.is_assignable_from(&value_ty) {
                            self.error(
                                value.location,
                                format!("cannot assign \"{}\" to \"{}\"", value_ty, target_ty),
                            );
                        }
                        Type::Void
                    }
                    Some(op) => match self.binary_type(*op, &target_ty, &value_ty, location) {
                        Type::Unknown => Type::Unknown,
                        _ => target_ty,
                    },
                }
            }
            ExprKind::Prefix { op, operand } => {
                let ty = self.check_expr(operand);
                let op = *op;
                match op {
                    PrefixOp::Inc | PrefixOp::Dec => self.increment_type(op.symbol(), operand, &ty),
                    PrefixOp::Not => self.unary_type(op.symbol(), Type::Bool, &ty, location),
                    PrefixOp::Plus | PrefixOp::Neg | PrefixOp::BitNot => {
                        self.unary_type(op.symbol(), Type::Int, &ty, location)
                    }
                }
            }
            ExprKind::Suffix { op, operand } => {
                let ty = self.check_expr(operand);
                self.increment_type(op.symbol(), operand, &ty)
            }
            ExprKind::Ternary { cond, then_expr, else_expr } => {
                self.check_condition(cond);
                let a = self.check_expr(then_expr);
                let b = self.check_expr(else_expr);
                if a.is_unknown() || b.is_unknown() {
                    Type::Unknown
                } else if a == b {
                    a
                } else if b == Type::Null && a.is_nullable() {
                    a
                } else if a == Type::Null && b.is_nullable() {
                    b
                } else {
                    self.error(
                        location,
                        format!("mismatched branches of \"?:\": \"{}\" and \"{}\"", a, b),
                    );
                    Type::Unknown
                }
            }
            ExprKind::Call { name, args, symbol } => {
                let arg_types = self.check_args(args);
                match self.symbols.resolve(&name.name, EntityKind::Function) {
                    Ok(id) => {
                        *symbol = Some(id);
                        let signature = self.symbols.get(id).ty().clone();
                        self.call_type(&name.name, &signature, &arg_types, location)
                    }
                    Err(err) => {
                        self.lookup_error(name.location, err);
                        Type::Unknown
                    }
                }
            }
            ExprKind::MethodCall { receiver, method, args, symbol } => {
                let receiver_ty = self.check_expr(receiver);
                let arg_types = self.check_args(args);
                if receiver_ty.is_unknown() {
                    return Type::Unknown;
                }
                match self.classes.member_of(&receiver_ty, &method.name) {
                    Ok(member) if member.kind == MemberKind::Method => {
                        *symbol = self.member_symbol(&receiver_ty, &method.name, EntityKind::Function);
                        self.call_type(&method.name, &member.ty, &arg_types, location)
                    }
                    Ok(_) => {
                        self.error(
                            method.location,
                            format!("member \"{}\" of \"{}\" is not a method", method.name, receiver_ty),
                        );
                        Type::Unknown
                    }
                    Err(err) => {
                        self.lookup_error(method.location, err);
                        Type::Unknown
                    }
                }
            }
            ExprKind::Member { object, field, symbol } => {
                let object_ty = self.check_expr(object);
                if object_ty.is_unknown() {
                    return Type::Unknown;
                }
                match self.classes.member_of(&object_ty, &field.name) {
                    Ok(member) if matches!(member.kind, MemberKind::Field(_)) => {
                        *symbol = self.member_symbol(&object_ty, &field.name, EntityKind::Variable);
                        member.ty
                    }
                    Ok(_) => {
                        self.error(
                            field.location,
                            format!("member \"{}\" of \"{}\" is not a field", field.name, object_ty),
                        );
                        Type::Unknown
                    }
                    Err(err) => {
                        self.lookup_error(field.location, err);
                        Type::Unknown
                    }
                }
            }
            ExprKind::Index { array, index } => {
                let array_ty = self.check_expr(array);
                let index_ty = self.check_expr(index);
                if index_ty != Type::Int && !index_ty.is_unknown() {
                    self.error(
                        index.location,
                        format!("array index must have type \"int\", but \"{}\" found", index_ty),
                    );
                }
                match array_ty {
                    Type::Array(elem) => *elem,
                    Type::Unknown => Type::Unknown,
                    other => {
                        self.error(array.location, format!("\"{}\" is not an array", other));
                        Type::Unknown
                    }
                }
            }
            ExprKind::NewObject { class, args, symbol } => {
                let arg_types = self.check_args(args);
                let ty = self.resolve_type(class);
                match &ty {
                    Type::Class { id, name } => {
                        let ctor = self.constructors.get(id).copied();
                        *symbol = ctor;
                        if let Some(ctor) = ctor {
                            let signature = self.symbols.get(ctor).ty().clone();
                            let name = name.to_string();
                            self.call_type(&name, &signature, &arg_types, location);
                        }
                        ty.clone()
                    }
                    Type::Unknown => Type::Unknown,
                    other => {
                        self.error(class.location, format!("cannot create an object of type \"{}\"", other));
                        Type::Unknown
                    }
                }
            }
            ExprKind::NewArray { elem, lengths, dims } => {
                for length in lengths.iter_mut() {
                    let ty = self.check_expr(length);
                    if ty != Type::Int && !ty.is_unknown() {
                        self.error(
                            length.location,
                            format!("array length must have type \"int\", but \"{}\" found", ty),
                        );
                    }
                }
                match self.resolve_type(elem) {
                    Type::Void => {
                        self.error(elem.location, "array element type cannot be \"void\"");
                        Type::Unknown
                    }
                    Type::Unknown => Type::Unknown,
                    base => Type::array_with_dims(base, *dims),
                }
            }
        }
    }

    fn check_args(&mut self, args: &mut [Expr]) -> Vec<Type> {
        args.iter_mut().map(|arg| self.check_expr(arg)).collect()
    }

    /// Symbol of a class member, found in the class's member scope
    fn member_symbol(&self, owner: &Type, name: &str, kind: EntityKind) -> Option<SymbolId> {
        let Type::Class { id, .. } = owner else { return None };
        let scope = self.class_scopes.get(id)?;
        self.symbols.lookup_in(*scope, name, kind)
    }

    /// Check arity and argument types against `signature`
    fn call_type(&mut self, name: &str, signature: &Type, args: &[Type], location: Location) -> Type {
        let Type::Function { ret, params } = signature else {
            return Type::Unknown;
        };
        let matches = params.len() == args.len()
            && params.iter().zip(args).all(|(param, arg)| param.is_assignable_from(arg));
        if !matches {
            let args: Vec<String> = args.iter().map(Type::to_string).collect();
            self.error(
                location,
                format!("cannot call function \"{}\" with ({})", name, args.join(", ")),
            );
        }
        (**ret).clone()
    }

    fn binary_type(&mut self, op: BinOp, left: &Type, right: &Type, location: Location) -> Type {
        if left.is_unknown() || right.is_unknown() {
            return Type::Unknown;
        }
        let result = match op {
            BinOp::Add => match (left, right) {
                (Type::Int, Type::Int) => Some(Type::Int),
                (Type::String, Type::String) => Some(Type::String),
                _ => None,
            },
            _ if op.is_arithmetic() || op.is_bitwise() => {
                (*left == Type::Int && *right == Type::Int).then_some(Type::Int)
            }
            BinOp::And | BinOp::Or => (*left == Type::Bool && *right == Type::Bool).then_some(Type::Bool),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => match (left, right) {
                (Type::Int, Type::Int) | (Type::String, Type::String) => Some(Type::Bool),
                _ => None,
            },
            BinOp::Eq | BinOp::Ne => {
                let comparable = (left == right && !matches!(left, Type::Void | Type::Function { .. }))
                    || (*left == Type::Null && (right.is_nullable() || *right == Type::Null))
                    || (*right == Type::Null && left.is_nullable());
                comparable.then_some(Type::Bool)
            }
            _ => None,
        };
        result.unwrap_or_else(|| {
            self.error(
                location,
                format!("invalid operands to \"{}\": \"{}\" and \"{}\"", op.symbol(), left, right),
            );
            Type::Unknown
        })
    }

    fn unary_type(&mut self, symbol: &str, expected: Type, found: &Type, location: Location) -> Type {
        if found.is_unknown() {
            return Type::Unknown;
        }
        if *found != expected {
            self.error(location, format!("invalid operand to \"{}\": \"{}\"", symbol, found));
            return Type::Unknown;
        }
        expected
    }

    /// `++`/`--` in either position
    fn increment_type(&mut self, symbol: &str, operand: &Expr, ty: &Type) -> Type {
        if ty.is_unknown() {
            return Type::Unknown;
        }
        if *ty != Type::Int {
            self.error(operand.location, format!("invalid operand to \"{}\": \"{}\"", symbol, ty));
            return Type::Unknown;
        }
        if !self.require_lvalue(operand) {
            return Type::Unknown;
        }
        Type::Int
    }

    /// Record an error unless `target` is addressable; flags written variables
    fn require_lvalue(&mut self, target: &Expr) -> bool {
        if target.ty.as_ref().map_or(true, Type::is_unknown) {
            return false;
        }
        match &target.kind {
            ExprKind::Ident { symbol: Some(id), .. } => {
                self.symbols.mark_mutated(*id);
                true
            }
            ExprKind::Member { .. } | ExprKind::Index { .. } => true,
            ExprKind::Prefix { op: PrefixOp::Inc | PrefixOp::Dec, .. } => true,
            _ => {
                self.error(target.location, "expression is not assignable");
                false
            }
        }
    }
}

fn stmt_location(stmt: &Stmt) -> Location {
    match stmt {
        Stmt::Block(block) => block.location,
        Stmt::Var(var) => var.location,
        Stmt::Expr(expr) => expr.location,
        Stmt::If { location, .. }
        | Stmt::While { location, .. }
        | Stmt::For { location, .. }
        | Stmt::Return { location, .. }
        | Stmt::Break { location }
        | Stmt::Continue { location }
        | Stmt::Empty { location } => *location,
    }
}

/// Analyze `program`, recording problems in `recorder`
pub fn analyze(program: &mut Program, recorder: &mut ErrorRecorder) -> Analysis {
    SemanticAnalyzer::new(recorder).analyze(program)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frontend::parser::parse_source;
    use pretty_assertions::assert_eq;

    fn analyze_source(source: &str) -> (Program, Analysis, ErrorRecorder) {
        let mut recorder = ErrorRecorder::new("test.mx");
        let mut program = parse_source(source, &mut recorder);
        assert_eq!(recorder.render(), "", "test source must parse");
        let analysis = analyze(&mut program, &mut recorder);
        (program, analysis, recorder)
    }

    /// Error messages of the semantic phase, in order
    fn errors(source: &str) -> Vec<String> {
        let (_, _, recorder) = analyze_source(source);
        recorder
            .diagnostics_of(Phase::Semantic)
            .filter(|d| d.severity == crate::diagnostics::Severity::Error)
            .map(|d| d.message.clone())
            .collect()
    }

    fn assert_ok(source: &str) {
        assert_eq!(errors(source), Vec::<String>::new());
    }

    fn collect_expr_types(expr: &Expr, out: &mut Vec<Option<Type>>) {
        out.push(expr.ty.clone());
        match &expr.kind {
            ExprKind::Binary { left, right, .. } => {
                collect_expr_types(left, out);
                collect_expr_types(right, out);
            }
            ExprKind::Assign { target, value, .. } => {
                collect_expr_types(target, out);
                collect_expr_types(value, out);
            }
            ExprKind::Prefix { operand, .. } | ExprKind::Suffix { operand, .. } => {
                collect_expr_types(operand, out)
            }
            ExprKind::Ternary { cond, then_expr, else_expr } => {
                collect_expr_types(cond, out);
                collect_expr_types(then_expr, out);
                collect_expr_types(else_expr, out);
            }
            ExprKind::Call { args, .. } | ExprKind::NewObject { args, .. } => {
                args.iter().for_each(|a| collect_expr_types(a, out))
            }
            ExprKind::MethodCall { receiver, args, .. } => {
                collect_expr_types(receiver, out);
                args.iter().for_each(|a| collect_expr_types(a, out));
            }
            ExprKind::Member { object, .. } => collect_expr_types(object, out),
            ExprKind::Index { array, index } => {
                collect_expr_types(array, out);
                collect_expr_types(index, out);
            }
            ExprKind::NewArray { lengths, .. } => lengths.iter().for_each(|a| collect_expr_types(a, out)),
            _ => {}
        }
    }

    fn collect_stmt_types(stmt: &Stmt, out: &mut Vec<Option<Type>>) {
        match stmt {
            Stmt::Block(block) => block.stmts.iter().for_each(|s| collect_stmt_types(s, out)),
            Stmt::Var(var) => var
                .declarators
                .iter()
                .filter_map(|d| d.init.as_ref())
                .for_each(|e| collect_expr_types(e, out)),
            Stmt::If { cond, then_branch, else_branch, .. } => {
                collect_expr_types(cond, out);
                collect_stmt_types(then_branch, out);
                if let Some(else_branch) = else_branch {
                    collect_stmt_types(else_branch, out);
                }
            }
            Stmt::While { cond, body, .. } => {
                collect_expr_types(cond, out);
                collect_stmt_types(body, out);
            }
            Stmt::For { init, cond, step, body, .. } => {
                match init {
                    Some(ForInit::Var(var)) => collect_stmt_types(&Stmt::Var(var.clone()), out),
                    Some(ForInit::Expr(e)) => collect_expr_types(e, out),
                    None => {}
                }
                cond.iter().chain(step.iter()).for_each(|e| collect_expr_types(e, out));
                collect_stmt_types(body, out);
            }
            Stmt::Return { value: Some(e), .. } | Stmt::Expr(e) => collect_expr_types(e, out),
            _ => {}
        }
    }

    fn all_expr_types(program: &Program) -> Vec<Option<Type>> {
        let mut out = Vec::new();
        let visit_fn = |f: &FunctionDecl, out: &mut Vec<Option<Type>>| {
            f.body.stmts.iter().for_each(|s| collect_stmt_types(s, out))
        };
        for decl in &program.decls {
            match decl {
                Decl::Function(f) => visit_fn(f, &mut out),
                Decl::Class(c) => c.methods.iter().chain(&c.constructors).for_each(|f| visit_fn(f, &mut out)),
                Decl::Variable(v) => collect_stmt_types(&Stmt::Var(v.clone()), &mut out),
            }
        }
        out
    }

    const WELL_TYPED: &str = r#"
        int counter = 0;
        class Node {
            int value;
            Node next;
            Node(int v) { value = v; next = null; }
            int sum() { if (next == null) return value; return value + next.sum(); }
        };
        string describe(Node n) { return "node " + toString(n.value); }
        int main() {
            Node head = new Node(1);
            head.next = new Node(2);
            int[][] grid = new int[3][];
            grid[0] = new int[2];
            bool ok = grid.size() == 3 && grid[0][1] < 10 || !true;
            for (int i = 0; i < 3; ++i) { counter += i; if (i == 1) continue; }
            while (counter > 0) { counter--; if (counter == 2) break; }
            string s = ok ? describe(head) : "none";
            println(s);
            printlnInt(head.sum() >>> 1);
            return 0;
        }
    "#;

    #[test]
    fn test_well_typed_program_has_no_unknown() {
        let (program, _, recorder) = analyze_source(WELL_TYPED);
        assert_eq!(recorder.render(), "");
        let types = all_expr_types(&program);
        assert!(!types.is_empty());
        for ty in types {
            let ty = ty.expect("every expression is annotated");
            assert!(!ty.contains_unknown(), "found {}", ty);
        }
    }

    #[test]
    fn test_assignment_type_mismatch() {
        assert_eq!(
            errors("int main() { int x; x = \"s\"; return 0; }"),
            vec!["cannot assign \"string\" to \"int\""]
        );
    }

    #[test]
    fn test_arity_mismatch() {
        assert_eq!(
            errors("int f(int a) { return a; } int main() { f(1, 2); return 0; }"),
            vec!["cannot call function \"f\" with (int, int)"]
        );
    }

    #[test]
    fn test_condition_must_be_bool() {
        assert_eq!(
            errors("int main() { if (1) {} return 0; }"),
            vec!["condition must have type \"bool\", but \"int\" found"]
        );
    }

    #[test]
    fn test_mutual_forward_references() {
        assert_ok(
            "bool even(int n) { if (n == 0) return true; return odd(n - 1); }\n\
             bool odd(int n) { if (n == 0) return false; return even(n - 1); }\n\
             int main() { return 0; }",
        );
    }

    #[test]
    fn test_one_diagnostic_per_undefined_use() {
        let (_, _, recorder) = analyze_source("int main() { int a = y + 1; y = a; return y * y; }");
        let lines: Vec<String> = recorder.diagnostics().iter().map(|d| d.to_string()).collect();
        assert_eq!(
            lines,
            vec![
                "test.mx:1:22 error: \"y\" cannot be resolved as a variable",
                "test.mx:1:29 error: \"y\" cannot be resolved as a variable",
                "test.mx:1:43 error: \"y\" cannot be resolved as a variable",
                "test.mx:1:47 error: \"y\" cannot be resolved as a variable",
            ]
        );
    }

    #[test]
    fn test_duplicates_and_shadowing() {
        assert_eq!(
            errors("int main() { int x; int x; { int x; } return 0; }"),
            vec!["\"x\" has already been defined as a variable"]
        );
        assert_eq!(
            errors("int f() { return 0; } int f() { return 1; } int main() { return 0; }"),
            vec!["\"f\" has already been defined as a function"]
        );
    }

    #[test]
    fn test_local_does_not_hide_function() {
        assert_ok("int f() { return 1; } int main() { int f = f(); return f; }");
    }

    #[test]
    fn test_methods_shadow_free_functions() {
        let (program, analysis, recorder) = analyze_source(
            "int get() { return 0; }\n\
             class A { int get() { return 1; } int twice() { return get() * 2; } };\n\
             int main() { return 0; }",
        );
        assert_eq!(recorder.total_errors(), 0);
        let Decl::Class(class) = &program.decls[1] else { panic!("expected class") };
        let Stmt::Return { value: Some(expr), .. } = &class.methods[1].body.stmts[0] else {
            panic!("expected return");
        };
        let ExprKind::Binary { left, .. } = &expr.kind else { panic!("expected binary") };
        let ExprKind::Call { symbol: Some(id), .. } = &left.kind else { panic!("expected call") };
        assert!(matches!(
            analysis.symbols.get(*id),
            Symbol::Function { kind: FunctionKind::Method(_), .. }
        ));
    }

    #[test]
    fn test_break_outside_loop() {
        assert_eq!(
            errors("int main() { break; while (true) { continue; } return 0; }"),
            vec!["\"break\" found without loop"]
        );
    }

    #[test]
    fn test_missing_main() {
        assert_eq!(errors("int f() { return 0; }"), vec!["cannot find function \"main()\""]);
        assert_eq!(errors("void main() {}"), vec!["cannot find function \"main()\""]);
    }

    #[test]
    fn test_void_variable_and_bad_initializer() {
        assert_eq!(
            errors("int main() { void v; int x = \"s\"; return 0; }"),
            vec![
                "cannot declare variable of void type",
                "cannot initialize \"x\" of type \"int\" with \"string\"",
            ]
        );
    }

    #[test]
    fn test_null_rules() {
        assert_ok("class A {}; int main() { A a = null; int[] b = null; bool c = a == null; return 0; }");
        assert_eq!(
            errors("int main() { int x = null; return 0; }"),
            vec!["cannot initialize \"x\" of type \"int\" with \"null\""]
        );
    }

    #[test]
    fn test_operator_typing() {
        assert_ok(
            "int main() { string s = \"a\" + \"b\"; bool b = s < \"c\"; int n = 7 >>> 1; \
             n += 1; s += \"x\"; return -n; }",
        );
        assert_eq!(
            errors("int main() { int n = 1 + \"a\"; bool b = !n; return 0; }"),
            vec![
                "invalid operands to \"+\": \"int\" and \"string\"",
                "invalid operand to \"!\": \"int\"",
            ]
        );
    }

    #[test]
    fn test_unknown_does_not_cascade() {
        assert_eq!(
            errors("int main() { int n = (missing + 1) * 2; if (missing < 3) {} return n; }"),
            vec![
                "\"missing\" cannot be resolved as a variable",
                "\"missing\" cannot be resolved as a variable",
            ]
        );
    }

    #[test]
    fn test_lvalues() {
        assert_ok("class A { int x; }; int main() { A a = new A; int[] b = new int[2]; a.x = 1; b[0]++; ++(++a.x); return 0; }");
        assert_eq!(
            errors("int main() { 1 = 2; int n; n++ ++; return 0; }"),
            vec!["expression is not assignable", "expression is not assignable"]
        );
    }

    #[test]
    fn test_members() {
        assert_eq!(
            errors("class A { int x; }; int main() { A a = new A(); int s = \"str\".size(); return a.y; }"),
            vec!["unknown member \"size\" of \"string\"", "unknown member \"y\" of \"A\""]
        );
    }

    #[test]
    fn test_string_methods() {
        assert_ok(
            "int main() { string s = getString(); \
             return s.length() + s.substring(0, 1).parseInt() + s.ord(0); }",
        );
        assert_eq!(
            errors("int main() { string s; string t = s.substring(1); bool b = s.length(); return s.ord(\"0\"); }"),
            vec![
                "cannot call function \"substring\" with (int)",
                "cannot initialize \"b\" of type \"bool\" with \"int\"",
                "cannot call function \"ord\" with (string)",
            ]
        );
    }

    #[test]
    fn test_variable_named_like_function() {
        assert_ok("int f = 1; int f() { return 2; } int main() { return f + f(); }");
        assert_eq!(
            errors("class A {}; int A; void A() {} int main() { return 0; }"),
            vec![
                "\"A\" has already been defined as a class",
                "\"A\" has already been defined as a class",
            ]
        );
    }

    #[test]
    fn test_this_and_constructor_arguments() {
        assert_ok("class P { int x; P(int v) { this.x = v; } P self() { return this; } }; int main() { P p = new P(3); return p.self().x; }");
        assert_eq!(
            errors("class P { P(int v) {} }; int main() { P p = new P(); return 0; }"),
            vec!["cannot call function \"P\" with ()"]
        );
        assert_eq!(errors("int main() { this; return 0; }"), vec!["\"this\" used outside of a class"]);
    }

    #[test]
    fn test_return_checks() {
        assert_eq!(
            errors("void f() { return 1; } int g() { return; } int main() { return \"s\"; }"),
            vec![
                "cannot return a value from a void function",
                "missing return value of type \"int\"",
                "cannot return \"string\" from a function returning \"int\"",
            ]
        );
    }

    #[test]
    fn test_unknown_class() {
        assert_eq!(
            errors("int main() { Foo f; return 0; }"),
            vec!["\"Foo\" cannot be resolved as a class"]
        );
    }

    #[test]
    fn test_mutation_flags() {
        let (program, analysis, _) = analyze_source("int main() { int a = 1; int b = 2; b = a; return b; }");
        let Decl::Function(main) = &program.decls[0] else { panic!("expected function") };
        let flags: Vec<bool> = main.body.stmts[..2]
            .iter()
            .map(|stmt| {
                let Stmt::Var(var) = stmt else { panic!("expected declaration") };
                let id = var.declarators[0].symbol.expect("declared");
                matches!(analysis.symbols.get(id), Symbol::Variable { mutated: true, .. })
            })
            .collect();
        assert_eq!(flags, vec![false, true]);
    }

    #[test]
    fn test_unreachable_statement_warning() {
        let (_, _, recorder) = analyze_source("int main() { return 0; printInt(1); printInt(2); }");
        assert_eq!(recorder.total_errors(), 0);
        assert_eq!(recorder.diagnostics().len(), 1);
        assert_eq!(recorder.diagnostics()[0].message, "unreachable statement");
    }

    #[test]
    fn test_default_constructor_registered() {
        let (_, analysis, _) = analyze_source("class A {}; int main() { A a = new A; return 0; }");
        let id = analysis.classes.lookup("A").expect("class");
        assert!(analysis.constructors.contains_key(&id));
        assert_eq!(
            analysis.classes.get(id).constructor,
            Some(Type::function(Type::Void, Vec::new()))
        );
    }
}
