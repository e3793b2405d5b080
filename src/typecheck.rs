// Bidirectional type checker (spec.md §4.2): two mutually recursive
// tree walks, `check_expr` over value expressions and `check_type` over
// type expressions, producing the typed IR (tc.rs) alongside each
// expression's type. Shaped after an `eval_expr`-over-a-scope-chain
// walk, generalized to Fble's richer type algebra and its
// Let/Poly/Link/Exec forms.

use crate::ast::{Expr, ExprKind, LetBinding, TypeExpr, TypeExprKind};
use crate::env::Env;
use crate::kind::Kind;
use crate::tc::{Tc, TcData, TcKind};
use crate::types::{DataKind, Type, TypeData, TypeHeap};
use crate::util::Loc;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TypeError {
    #[error("undefined variable {0}")]
    Undefined(String),

    #[error("expected {expected}, found {found}")]
    Mismatch { expected: String, found: String },

    #[error("expected a function, found {0}")]
    NotAFunction(String),

    #[error("expected a struct type, found {0}")]
    NotAStruct(String),

    #[error("expected a union type, found {0}")]
    NotAUnion(String),

    #[error("expected a polymorphic value, found {0}")]
    NotAPoly(String),

    #[error("no field named {0}")]
    UnknownField(String),

    #[error("duplicate field {0}")]
    DuplicateField(String),

    #[error("expected {expected} arguments, found {found}")]
    WrongArgCount { expected: usize, found: usize },

    #[error("binding for {0} is vacuous")]
    Vacuous(String),

    #[error("union select branches must cover every tag in declaration order; missing {0}")]
    MissingBranch(String),

    #[error("union select branch {0} does not match any tag")]
    UnexpectedBranch(String),

    #[error("branches of union select must all produce the same type")]
    BranchTypeMismatch,

    #[error("expected kind level {expected}, found {found}")]
    KindLevelMismatch { expected: usize, found: usize },
}

type Check<T> = Result<T, TypeError>;

/// Which half of a link a binding names, if any (spec.md §4.5). Tracked
/// on the binding itself so a bare read of a get-port or an application of
/// a put-port can be recognised at the point of use and lowered to the
/// dedicated `Get`/`Put` instructions instead of an ordinary var read or
/// function call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PortRole {
    Get,
    Put,
}

/// Binds both a value's static type and the frame-position bookkeeping
/// the checker's scope chain carries (spec.md §4.2's per-binding
/// `{name, type, used, accessed, index}`); `index` is reassigned at
/// lowering time by irgen's own environment, so here it is purely
/// informational (definition order within its scope).
#[derive(Clone)]
pub struct Binding {
    pub ty: Type,
    pub port: Option<PortRole>,
}

impl Binding {
    fn value(ty: Type) -> Binding {
        Binding { ty, port: None }
    }
}

pub struct TypeChecker<'h> {
    pub heap: &'h mut TypeHeap,
}

impl<'h> TypeChecker<'h> {
    pub fn new(heap: &'h mut TypeHeap) -> TypeChecker<'h> {
        TypeChecker { heap }
    }

    fn describe(&mut self, t: Type) -> String {
        match self.heap.normalise(t) {
            None => "<vacuous>".to_string(),
            Some(n) => format!("{:?}", self.heap.get(n)),
        }
    }

    fn mismatch(&mut self, expected: Type, found: Type) -> TypeError {
        TypeError::Mismatch { expected: self.describe(expected), found: self.describe(found) }
    }

    fn require_equal(&mut self, vars: &mut HashMap<Type, Type>, expected: Type, found: Type) -> Check<()> {
        if self.heap.types_equal(vars, expected, found) {
            Ok(())
        } else {
            Err(self.mismatch(expected, found))
        }
    }

    pub fn check_expr(&mut self, scope: &Env<Binding>, expr: &Expr) -> Check<(Type, Tc)> {
        let loc = expr.loc.clone();
        let result = self.check_expr_kind(scope, &loc, expr);
        if let Err(e) = &result {
            log::debug!("type error at {}: {}", loc, e);
        }
        result
    }

    fn check_expr_kind(&mut self, scope: &Env<Binding>, loc: &Loc, expr: &Expr) -> Check<(Type, Tc)> {
        let loc = loc.clone();
        match &expr.kind {
            ExprKind::Var(name) => {
                let binding = scope.get(name).ok_or_else(|| TypeError::Undefined(name.clone()))?;
                let kind = match binding.port {
                    // A bare read of a get-port IS the process that
                    // performs the dequeue; there is no other way to
                    // mention it (spec.md §4.5).
                    Some(PortRole::Get) => TcKind::LinkGet { name: name.clone() },
                    Some(PortRole::Put) | None => TcKind::Var(name.clone()),
                };
                Ok((binding.ty, TcData::new(binding.ty, loc, kind)))
            }

            ExprKind::TypeValue(texpr) => {
                let ty = self.check_type(scope, texpr)?;
                let type_of_ty = self.heap.new_type(TypeData::TypeOf { inner: ty });
                Ok((type_of_ty, TcData::new(type_of_ty, loc, TcKind::TypeValue)))
            }

            ExprKind::Let { recursive, bindings, body } => {
                self.check_let(scope, loc, *recursive, bindings, body)
            }

            ExprKind::StructValue(fields) => self.check_struct_value(scope, loc, fields),

            ExprKind::UnionValue { ty, tag, arg } => {
                self.check_union_value(scope, loc, ty, tag, arg)
            }

            ExprKind::DataAccess { obj, field } => self.check_data_access(scope, loc, obj, field),

            ExprKind::UnionSelect { condition, arms, default } => {
                self.check_union_select(scope, loc, condition, arms, default.as_ref())
            }

            ExprKind::FuncValue { args, body } => self.check_func_value(scope, loc, args, body),

            ExprKind::FuncApply { func, args } => self.check_func_apply(scope, loc, func, args),

            ExprKind::Eval(inner) => {
                let (ty, tc) = self.check_expr(scope, inner)?;
                let proc_ty = self.heap.new_type(TypeData::Proc { elem: ty });
                Ok((proc_ty, tc))
            }

            ExprKind::Link { ty, get, put, body } => self.check_link(scope, loc, ty, get, put, body),

            ExprKind::Exec { bindings, body } => self.check_exec(scope, loc, bindings, body),

            ExprKind::PolyValue { arg, arg_kind_level, body } => {
                self.check_poly_value(scope, loc, arg, *arg_kind_level, body)
            }

            ExprKind::PolyApply { poly, arg } => self.check_poly_apply(scope, loc, poly, arg),

            ExprKind::List(elems) => self.check_list(scope, loc, elems),

            ExprKind::Literal(text) => self.check_literal(loc, text),
        }
    }

    /// Like `check_expr`, but variable lookups go through `Env::peek` so
    /// they're not counted as captures — for type expressions nested
    /// inside value expressions.
    pub fn check_expr_for_type(&mut self, scope: &Env<Binding>, expr: &Expr) -> Check<(Type, Tc)> {
        match &expr.kind {
            ExprKind::Var(name) => {
                let binding = scope.peek(name).ok_or_else(|| TypeError::Undefined(name.clone()))?;
                Ok((binding.ty, TcData::new(binding.ty, expr.loc.clone(), TcKind::Var(name.clone()))))
            }
            _ => self.check_expr(scope, expr),
        }
    }

    pub fn check_type(&mut self, scope: &Env<Binding>, texpr: &TypeExpr) -> Check<Type> {
        let result = self.check_type_kind(scope, texpr);
        if let Err(e) = &result {
            log::debug!("type error at {}: {}", texpr.loc, e);
        }
        result
    }

    fn check_type_kind(&mut self, scope: &Env<Binding>, texpr: &TypeExpr) -> Check<Type> {
        match &texpr.kind {
            TypeExprKind::Var(name) => {
                let binding =
                    scope.peek(name).ok_or_else(|| TypeError::Undefined(name.clone()))?;
                Ok(binding.ty)
            }
            TypeExprKind::Struct(fields) => self.check_data_type(scope, DataKind::Struct, fields),
            TypeExprKind::Union(fields) => self.check_data_type(scope, DataKind::Union, fields),
            TypeExprKind::Func { args, result } => {
                let args =
                    args.iter().map(|a| self.check_type(scope, a)).collect::<Check<Vec<_>>>()?;
                let result = self.check_type(scope, result)?;
                Ok(self.heap.new_type(TypeData::Func { args, result }))
            }
            TypeExprKind::Proc(elem) => {
                let elem = self.check_type(scope, elem)?;
                Ok(self.heap.new_type(TypeData::Proc { elem }))
            }
            TypeExprKind::Poly { arg, arg_kind_level, body } => {
                let kind = Kind::basic(*arg_kind_level, texpr.loc.clone());
                let var = self.heap.new_var(kind, arg.clone(), false, texpr.loc.clone());
                let inner = Env::chain(scope);
                inner.define(arg.clone(), Binding::value(var));
                let body_ty = self.check_type(&inner, body)?;
                Ok(self.heap.new_type(TypeData::Poly { var, body: body_ty }))
            }
            TypeExprKind::PolyApply { poly, arg } => {
                let poly_ty = self.check_type(scope, poly)?;
                let arg_ty = self.check_type(scope, arg)?;
                let applied = self.heap.new_type(TypeData::PolyApply { poly: poly_ty, arg: arg_ty });
                self.heap
                    .normalise(applied)
                    .ok_or_else(|| TypeError::Vacuous("poly application".to_string()))
            }
            TypeExprKind::TypeOf(value_expr) => {
                let (ty, _tc) = self.check_expr_for_type(scope, value_expr)?;
                Ok(ty)
            }
        }
    }

    fn check_data_type(
        &mut self,
        scope: &Env<Binding>,
        kind: DataKind,
        fields: &[(String, TypeExpr)],
    ) -> Check<Type> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::with_capacity(fields.len());
        for (name, texpr) in fields {
            if !seen.insert(name.clone()) {
                return Err(TypeError::DuplicateField(name.clone()));
            }
            out.push((name.clone(), self.check_type(scope, texpr)?));
        }
        Ok(self.heap.new_type(TypeData::Data { kind, fields: out }))
    }

    fn check_let(
        &mut self,
        scope: &Env<Binding>,
        loc: Loc,
        recursive: bool,
        bindings: &[LetBinding],
        body: &Expr,
    ) -> Check<(Type, Tc)> {
        let inner = Env::chain(scope);
        let mut tc_bindings = Vec::with_capacity(bindings.len());

        if recursive {
            // Forward-declare every binding as an abstract Var so the
            // bindings can reference each other and themselves.
            let mut vars = Vec::with_capacity(bindings.len());
            for b in bindings {
                let level = b.kind_level.unwrap_or(0);
                let var = self.heap.new_var(Kind::basic(level, b.loc.clone()), b.name.clone(), true, b.loc.clone());
                inner.define(b.name.clone(), Binding::value(var));
                vars.push(var);
            }
            for (b, var) in bindings.iter().zip(vars.iter()) {
                let (value_ty, value_tc) = self.check_expr(&inner, &b.value)?;
                if !self.heap.define_var(*var, value_ty) {
                    return Err(TypeError::Vacuous(b.name.clone()));
                }
                tc_bindings.push((b.name.clone(), value_tc));
            }
        } else {
            for b in bindings {
                let (_value_ty, value_tc) = self.check_expr(&inner, &b.value)?;
                inner.define(b.name.clone(), Binding::value(value_tc.ty));
                tc_bindings.push((b.name.clone(), value_tc));
            }
        }

        let (body_ty, body_tc) = self.check_expr(&inner, body)?;
        Ok((
            body_ty,
            TcData::new(body_ty, loc, TcKind::Let { recursive, bindings: tc_bindings, body: body_tc }),
        ))
    }

    fn check_struct_value(
        &mut self,
        scope: &Env<Binding>,
        loc: Loc,
        fields: &[(String, Expr)],
    ) -> Check<(Type, Tc)> {
        let mut seen = std::collections::HashSet::new();
        let mut field_types = Vec::with_capacity(fields.len());
        let mut field_tcs = Vec::with_capacity(fields.len());
        for (name, expr) in fields {
            if !seen.insert(name.clone()) {
                return Err(TypeError::DuplicateField(name.clone()));
            }
            let (ty, tc) = self.check_expr(scope, expr)?;
            field_types.push((name.clone(), ty));
            field_tcs.push(tc);
        }
        let struct_ty = self.heap.new_type(TypeData::Data { kind: DataKind::Struct, fields: field_types });
        Ok((struct_ty, TcData::new(struct_ty, loc, TcKind::StructValue { fields: field_tcs })))
    }

    fn check_union_value(
        &mut self,
        scope: &Env<Binding>,
        loc: Loc,
        ty: &TypeExpr,
        tag: &str,
        arg: &Expr,
    ) -> Check<(Type, Tc)> {
        let union_ty = self.check_type(scope, ty)?;
        let fields = match self.heap.get(union_ty) {
            TypeData::Data { kind: DataKind::Union, fields } => fields.clone(),
            other => return Err(TypeError::NotAUnion(format!("{:?}", other))),
        };
        let (tag_index, (_, field_ty)) = fields
            .iter()
            .enumerate()
            .find(|(_, (n, _))| n == tag)
            .ok_or_else(|| TypeError::UnknownField(tag.to_string()))?;
        let field_ty = *field_ty;
        let (arg_ty, arg_tc) = self.check_expr(scope, arg)?;
        let mut vars = HashMap::new();
        self.require_equal(&mut vars, field_ty, arg_ty)?;
        Ok((union_ty, TcData::new(union_ty, loc, TcKind::UnionValue { tag: tag_index, field_count: fields.len(), arg: arg_tc })))
    }

    fn check_data_access(
        &mut self,
        scope: &Env<Binding>,
        loc: Loc,
        obj: &Expr,
        field: &str,
    ) -> Check<(Type, Tc)> {
        let (obj_ty, obj_tc) = self.check_expr(scope, obj)?;
        let normalised = self.heap.normalise(obj_ty).ok_or_else(|| TypeError::Vacuous("struct access".to_string()))?;
        let (kind, fields) = match self.heap.get(normalised) {
            TypeData::Data { kind, fields } => (*kind, fields.clone()),
            other => return Err(TypeError::NotAStruct(format!("{:?}", other))),
        };
        let (index, (_, field_ty)) = fields
            .iter()
            .enumerate()
            .find(|(_, (n, _))| n == field)
            .ok_or_else(|| TypeError::UnknownField(field.to_string()))?;
        let field_ty = *field_ty;
        Ok((field_ty, TcData::new(field_ty, loc, TcKind::DataAccess { object: obj_tc, field: index, kind })))
    }

    fn check_union_select(
        &mut self,
        scope: &Env<Binding>,
        loc: Loc,
        condition: &Expr,
        arms: &[(String, Expr)],
        default: Option<&Expr>,
    ) -> Check<(Type, Tc)> {
        let (cond_ty, cond_tc) = self.check_expr(scope, condition)?;
        let normalised = self.heap.normalise(cond_ty).ok_or_else(|| TypeError::Vacuous("union select".to_string()))?;
        let tags = match self.heap.get(normalised) {
            TypeData::Data { kind: DataKind::Union, fields } => {
                fields.iter().map(|(n, _)| n.clone()).collect::<Vec<_>>()
            }
            other => return Err(TypeError::NotAUnion(format!("{:?}", other))),
        };

        let mut arm_iter = arms.iter();
        let mut compiled = Vec::with_capacity(tags.len());
        let mut result_ty: Option<Type> = None;
        let mut vars = HashMap::new();

        for tag in &tags {
            let tc = match arm_iter.next() {
                Some((name, expr)) if name == tag => {
                    let (ty, tc) = self.check_expr(scope, expr)?;
                    match result_ty {
                        None => result_ty = Some(ty),
                        Some(expected) => {
                            if !self.heap.types_equal(&mut vars, expected, ty) {
                                return Err(TypeError::BranchTypeMismatch);
                            }
                        }
                    }
                    tc
                }
                _ => match default {
                    Some(expr) => {
                        let (ty, tc) = self.check_expr(scope, expr)?;
                        match result_ty {
                            None => result_ty = Some(ty),
                            Some(expected) => {
                                if !self.heap.types_equal(&mut vars, expected, ty) {
                                    return Err(TypeError::BranchTypeMismatch);
                                }
                            }
                        }
                        tc
                    }
                    None => return Err(TypeError::MissingBranch(tag.clone())),
                },
            };
            compiled.push(tc);
        }
        if let Some((extra, _)) = arm_iter.next() {
            return Err(TypeError::UnexpectedBranch(extra.clone()));
        }

        let result_ty = result_ty.ok_or_else(|| TypeError::MissingBranch("<all>".to_string()))?;
        Ok((
            result_ty,
            TcData::new(result_ty, loc, TcKind::UnionSelect { condition: cond_tc, arms: compiled }),
        ))
    }

    fn check_func_value(
        &mut self,
        scope: &Env<Binding>,
        loc: Loc,
        args: &[(String, TypeExpr)],
        body: &Expr,
    ) -> Check<(Type, Tc)> {
        let mut arg_types = Vec::with_capacity(args.len());
        for (_, texpr) in args {
            arg_types.push(self.check_type(scope, texpr)?);
        }
        let inner = Env::function(scope);
        for ((name, _), ty) in args.iter().zip(arg_types.iter()) {
            inner.define(name.clone(), Binding::value(*ty));
        }
        let (body_ty, body_tc) = self.check_expr(&inner, body)?;
        let func_ty = self.heap.new_type(TypeData::Func { args: arg_types, result: body_ty });
        let captured = inner.captures().unwrap_or_default();
        let arg_names = args.iter().map(|(n, _)| n.clone()).collect();
        Ok((func_ty, TcData::new(func_ty, loc, TcKind::FuncValue { arg_names, captured, body: body_tc })))
    }

    fn check_func_apply(
        &mut self,
        scope: &Env<Binding>,
        loc: Loc,
        func: &Expr,
        args: &[Expr],
    ) -> Check<(Type, Tc)> {
        // A put-port applied to its one argument enqueues and wakes a
        // waiter (spec.md §4.5) rather than performing an ordinary call;
        // recognise it here, before the generic function-application path,
        // by checking whether `func` names a binding tagged as a put-port.
        if let ExprKind::Var(name) = &func.kind {
            if let Some(binding) = scope.get(name) {
                if binding.port == Some(PortRole::Put) {
                    let normalised = self
                        .heap
                        .normalise(binding.ty)
                        .ok_or_else(|| TypeError::Vacuous("function application".to_string()))?;
                    let (param_types, result_ty) = match self.heap.get(normalised) {
                        TypeData::Func { args, result } => (args.clone(), *result),
                        other => return Err(TypeError::NotAFunction(format!("{:?}", other))),
                    };
                    if param_types.len() != 1 || args.len() != 1 {
                        return Err(TypeError::WrongArgCount { expected: param_types.len(), found: args.len() });
                    }
                    let (arg_ty, arg_tc) = self.check_expr(scope, &args[0])?;
                    let mut vars = HashMap::new();
                    self.require_equal(&mut vars, param_types[0], arg_ty)?;
                    return Ok((
                        result_ty,
                        TcData::new(result_ty, loc, TcKind::LinkPut { name: name.clone(), value: arg_tc }),
                    ));
                }
            }
        }

        let (func_ty, func_tc) = self.check_expr(scope, func)?;
        let normalised = self.heap.normalise(func_ty).ok_or_else(|| TypeError::Vacuous("function application".to_string()))?;
        let (param_types, result_ty) = match self.heap.get(normalised) {
            TypeData::Func { args, result } => (args.clone(), *result),
            other => return Err(TypeError::NotAFunction(format!("{:?}", other))),
        };
        if param_types.len() != args.len() {
            return Err(TypeError::WrongArgCount { expected: param_types.len(), found: args.len() });
        }
        let mut arg_tcs = Vec::with_capacity(args.len());
        let mut vars = HashMap::new();
        for (param_ty, arg_expr) in param_types.iter().zip(args.iter()) {
            let (arg_ty, arg_tc) = self.check_expr(scope, arg_expr)?;
            self.require_equal(&mut vars, *param_ty, arg_ty)?;
            arg_tcs.push(arg_tc);
        }
        Ok((result_ty, TcData::new(result_ty, loc, TcKind::FuncApply { func: func_tc, args: arg_tcs })))
    }

    fn check_link(
        &mut self,
        scope: &Env<Binding>,
        loc: Loc,
        ty: &TypeExpr,
        get: &str,
        put: &str,
        body: &Expr,
    ) -> Check<(Type, Tc)> {
        let elem_ty = self.check_type(scope, ty)?;
        let get_ty = self.heap.new_type(TypeData::Proc { elem: elem_ty });
        let unit_result = self.heap.new_type(TypeData::Data { kind: DataKind::Struct, fields: vec![] });
        let put_proc = self.heap.new_type(TypeData::Proc { elem: unit_result });
        let put_ty = self.heap.new_type(TypeData::Func { args: vec![elem_ty], result: put_proc });

        let inner = Env::chain(scope);
        inner.define(get.to_string(), Binding { ty: get_ty, port: Some(PortRole::Get) });
        inner.define(put.to_string(), Binding { ty: put_ty, port: Some(PortRole::Put) });
        let (body_ty, body_tc) = self.check_expr(&inner, body)?;

        let link_tc = TcData::new(
            body_ty,
            loc,
            TcKind::Link { get_name: get.to_string(), put_name: put.to_string(), body: body_tc },
        );
        Ok((body_ty, link_tc))
    }

    fn check_exec(
        &mut self,
        scope: &Env<Binding>,
        loc: Loc,
        bindings: &[(String, TypeExpr, Expr)],
        body: &Expr,
    ) -> Check<(Type, Tc)> {
        let inner = Env::chain(scope);
        let mut tc_bindings = Vec::with_capacity(bindings.len());
        for (name, texpr, proc_expr) in bindings {
            let elem_ty = self.check_type(scope, texpr)?;
            let expected_proc = self.heap.new_type(TypeData::Proc { elem: elem_ty });
            let (proc_ty, proc_tc) = self.check_expr(&inner, proc_expr)?;
            let mut vars = HashMap::new();
            self.require_equal(&mut vars, expected_proc, proc_ty)?;
            inner.define(name.clone(), Binding::value(elem_ty));
            tc_bindings.push((name.clone(), proc_tc));
        }
        let (body_ty, body_tc) = self.check_expr(&inner, body)?;
        Ok((body_ty, TcData::new(body_ty, loc, TcKind::Exec { bindings: tc_bindings, body: body_tc })))
    }

    fn check_poly_value(
        &mut self,
        scope: &Env<Binding>,
        loc: Loc,
        arg: &str,
        arg_kind_level: usize,
        body: &Expr,
    ) -> Check<(Type, Tc)> {
        let kind = Kind::basic(arg_kind_level, loc.clone());
        let var = self.heap.new_var(kind, arg.to_string(), false, loc.clone());
        let inner = Env::chain(scope);
        inner.define(arg.to_string(), Binding::value(var));
        let (body_ty, body_tc) = self.check_expr(&inner, body)?;
        let poly_ty = self.heap.new_type(TypeData::Poly { var, body: body_ty });
        // A poly value erases to its body's own runtime representation
        // (spec.md §3.3 lists no distinct Tc node for poly values/
        // applications): only the static type changes.
        Ok((poly_ty, TcData::new(poly_ty, loc, body_tc.kind.clone())))
    }

    fn check_poly_apply(
        &mut self,
        scope: &Env<Binding>,
        loc: Loc,
        poly: &Expr,
        arg: &TypeExpr,
    ) -> Check<(Type, Tc)> {
        let (poly_ty, poly_tc) = self.check_expr(scope, poly)?;
        let normalised = self.heap.normalise(poly_ty).ok_or_else(|| TypeError::Vacuous("poly application".to_string()))?;
        if !matches!(self.heap.get(normalised), TypeData::Poly { .. }) {
            return Err(TypeError::NotAPoly(format!("{:?}", self.heap.get(normalised))));
        }
        let arg_ty = self.check_type(scope, arg)?;
        let applied = self.heap.new_type(TypeData::PolyApply { poly: normalised, arg: arg_ty });
        let result_ty = self.heap.normalise(applied).ok_or_else(|| TypeError::Vacuous("poly application".to_string()))?;
        // Erases to the poly value's own representation, same as
        // `check_poly_value` (spec.md §3.3's Tc set has no PolyApply node).
        Ok((result_ty, TcData::new(result_ty, loc, poly_tc.kind.clone())))
    }

    fn check_list(&mut self, scope: &Env<Binding>, loc: Loc, elems: &[Expr]) -> Check<(Type, Tc)> {
        let mut tcs = Vec::with_capacity(elems.len());
        let mut elem_ty: Option<Type> = None;
        let mut vars = HashMap::new();
        for e in elems {
            let (ty, tc) = self.check_expr(scope, e)?;
            match elem_ty {
                None => elem_ty = Some(ty),
                Some(expected) => self.require_equal(&mut vars, expected, ty)?,
            }
            tcs.push(tc);
        }
        let ty = elem_ty.unwrap_or_else(|| self.heap.new_type(TypeData::Data { kind: DataKind::Struct, fields: vec![] }));
        Ok((ty, TcData::new(ty, loc, TcKind::List { elems: tcs })))
    }

    fn check_literal(&mut self, loc: Loc, text: &str) -> Check<(Type, Tc)> {
        let char_ty = self.heap.new_type(TypeData::Data { kind: DataKind::Union, fields: vec![] });
        let chars = text
            .chars()
            .map(|_| TcData::new(char_ty, loc.clone(), TcKind::StructValue { fields: vec![] }))
            .collect();
        Ok((char_ty, TcData::new(char_ty, loc, TcKind::Literal { chars })))
    }
}
