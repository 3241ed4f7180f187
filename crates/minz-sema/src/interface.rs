//! Interface monomorphization (spec §4.6).
//!
//! For each `impl Interface for Type { … }`, method bodies are
//! emitted as regular functions with mangled names
//! `Type_Interface_method$Type$…`. A method call whose receiver's
//! concrete type is known at compile time lowers to a direct call to
//! that function; no vtable is ever emitted. When the concrete type
//! cannot be determined, compilation fails with
//! `PolymorphicDispatchRequiresConcreteType`.

use rustc_hash::FxHashMap;

use minz_diagnostics::{Diagnostic, Position};
use minz_types::Type;

use crate::mangle::mangle_interface_method;

/// Registry of `impl Interface for Type` blocks, keyed by
/// `(type_name, interface_name, method_name)`.
#[derive(Default)]
pub struct ImplRegistry {
    impls: FxHashMap<(String, String, String), String>,
}

impl ImplRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one `impl` method, returning its mangled symbol.
    pub fn register(&mut self, type_name: &str, interface_name: &str, method: &str, params: &[Type]) -> String {
        let mangled = mangle_interface_method(type_name, interface_name, method, params);
        self.impls.insert((type_name.to_string(), interface_name.to_string(), method.to_string()), mangled.clone());
        mangled
    }

    /// Resolve `receiver_type.method(...)` to the concrete
    /// implementation's mangled symbol, given the statically known
    /// concrete type of the receiver and which interface (if any) is
    /// expected. `receiver_type` must already be a concrete
    /// (non-interface) type: the caller is responsible for rejecting
    /// an interface-typed receiver before calling this (§4.6: when the
    /// concrete type is not known, it's a hard error, not a fallback).
    pub fn resolve_call(&self, receiver_type: &Type, interface_name: Option<&str>, method: &str, pos: Position) -> Result<String, Diagnostic> {
        if let Type::Interface(_) = receiver_type {
            return Err(Diagnostic::PolymorphicDispatchRequiresConcreteType { pos });
        }
        let type_name = concrete_type_name(receiver_type, pos)?;
        if let Some(iface) = interface_name {
            return self
                .impls
                .get(&(type_name.clone(), iface.to_string(), method.to_string()))
                .cloned()
                .ok_or(Diagnostic::PolymorphicDispatchRequiresConcreteType { pos });
        }
        // No interface named explicitly: search every registered
        // impl for this concrete type exposing `method`, succeeding
        // only if exactly one interface provides it.
        let candidates: Vec<&String> = self
            .impls
            .iter()
            .filter(|((t, _, m), _)| t == &type_name && m == method)
            .map(|(_, mangled)| mangled)
            .collect();
        match candidates.as_slice() {
            [one] => Ok((*one).clone()),
            _ => Err(Diagnostic::PolymorphicDispatchRequiresConcreteType { pos }),
        }
    }
}

fn concrete_type_name(ty: &Type, pos: Position) -> Result<String, Diagnostic> {
    match ty {
        Type::Struct(s) => Ok(s.name.clone()),
        Type::Enum(e) => Ok(e.name.clone()),
        Type::BitStruct(b) => Ok(b.name.clone()),
        Type::U8 => Ok("u8".into()),
        Type::U16 => Ok("u16".into()),
        Type::U24 => Ok("u24".into()),
        Type::I8 => Ok("i8".into()),
        Type::I16 => Ok("i16".into()),
        Type::I24 => Ok("i24".into()),
        Type::Bool => Ok("bool".into()),
        _ => Err(Diagnostic::PolymorphicDispatchRequiresConcreteType { pos }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn known_concrete_type_resolves_directly() {
        let mut reg = ImplRegistry::new();
        let mangled = reg.register("Player", "Drawable", "draw", &[]);
        assert_eq!(mangled, "Player_Drawable_draw");
        let sdef = Rc::new(minz_types::StructDef { name: "Player".into(), fields: vec![] });
        let resolved = reg.resolve_call(&Type::Struct(sdef), Some("Drawable"), "draw", Position::synthetic()).unwrap();
        assert_eq!(resolved, "Player_Drawable_draw");
    }

    #[test]
    fn interface_typed_receiver_is_rejected() {
        let reg = ImplRegistry::new();
        let idef = Rc::new(minz_types::InterfaceDef { name: "Drawable".into(), methods: vec![] });
        let err = reg.resolve_call(&Type::Interface(idef), None, "draw", Position::synthetic()).unwrap_err();
        assert_eq!(err.kind_str(), "PolymorphicDispatchRequiresConcreteType");
    }

    #[test]
    fn unregistered_method_is_rejected() {
        let reg = ImplRegistry::new();
        let sdef = Rc::new(minz_types::StructDef { name: "Player".into(), fields: vec![] });
        let err = reg.resolve_call(&Type::Struct(sdef), Some("Drawable"), "draw", Position::synthetic()).unwrap_err();
        assert_eq!(err.kind_str(), "PolymorphicDispatchRequiresConcreteType");
    }
}
