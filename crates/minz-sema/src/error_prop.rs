//! Error-propagation lowering (spec §4.7).
//!
//! The postfix `?` operator is valid only inside a function whose
//! declared return type is an error-union. This module validates that
//! context and types the `?`/`??` operators (the actual branch/return
//! instructions are emitted by `minz_mir::builder`, which consults the
//! same `ErrorUnion` return type to know what to return on the error
//! path).

use minz_diagnostics::{Diagnostic, Position};
use minz_types::Type;

/// Checked at every `expr?` site: `enclosing_ret` must be an
/// `ErrorUnion` whose error enum matches `expr`'s error-union type, or
/// it's a context error. Returns the ok-payload type.
pub fn check_try(expr_ty: &Type, enclosing_ret: &Type, pos: Position) -> Result<Type, Diagnostic> {
    let Type::ErrorUnion(enclosing_ok, enclosing_err) = enclosing_ret else {
        return Err(Diagnostic::TypeMismatch {
            expected: "an error-union return type (required to use `?`)".into(),
            actual: enclosing_ret.to_string(),
            pos,
        });
    };
    let Type::ErrorUnion(ok, err) = expr_ty else {
        return Err(Diagnostic::TypeMismatch { expected: "an error-union expression".into(), actual: expr_ty.to_string(), pos });
    };
    if !std::rc::Rc::ptr_eq(err, enclosing_err) {
        return Err(Diagnostic::TypeMismatch { expected: enclosing_err.name.clone(), actual: err.name.clone(), pos });
    }
    let _ = enclosing_ok;
    Ok((**ok).clone())
}

/// `a ?? b`: `a` must be an error-union; on error, yields `b`. Both
/// operands must be assignable to a common type (checked by the
/// caller via `minz_types::assignable`/promotion as for any binary
/// operator); this just extracts `a`'s ok type.
pub fn check_coalesce(a_ty: &Type, pos: Position) -> Result<Type, Diagnostic> {
    match a_ty {
        Type::ErrorUnion(ok, _) => Ok((**ok).clone()),
        other => Err(Diagnostic::TypeMismatch { expected: "an error-union type".into(), actual: other.to_string(), pos }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_types::EnumDef;
    use std::rc::Rc;

    #[test]
    fn try_outside_error_union_function_is_rejected() {
        let err_enum = Rc::new(EnumDef { name: "IoError".into(), variants: vec![("NotFound".into(), 0)] });
        let expr_ty = Type::ErrorUnion(Rc::new(Type::U8), err_enum);
        let err = check_try(&expr_ty, &Type::Void, Position::synthetic()).unwrap_err();
        assert_eq!(err.kind_str(), "TypeMismatch");
    }

    #[test]
    fn try_yields_ok_payload_type() {
        let err_enum = Rc::new(EnumDef { name: "IoError".into(), variants: vec![("NotFound".into(), 0)] });
        let expr_ty = Type::ErrorUnion(Rc::new(Type::U8), err_enum.clone());
        let ret_ty = Type::ErrorUnion(Rc::new(Type::U16), err_enum);
        let ok = check_try(&expr_ty, &ret_ty, Position::synthetic()).unwrap();
        assert_eq!(ok, Type::U8);
    }

    #[test]
    fn mismatched_error_enums_rejected() {
        let enum_a = Rc::new(EnumDef { name: "IoError".into(), variants: vec![] });
        let enum_b = Rc::new(EnumDef { name: "NetError".into(), variants: vec![] });
        let expr_ty = Type::ErrorUnion(Rc::new(Type::U8), enum_a);
        let ret_ty = Type::ErrorUnion(Rc::new(Type::U8), enum_b);
        assert!(check_try(&expr_ty, &ret_ty, Position::synthetic()).is_err());
    }
}
