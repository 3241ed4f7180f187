//! The MinZ type system (spec §3.1).
//!
//! Two types are equal iff structurally identical, except that named
//! struct/enum/interface declarations compare by nominal identity:
//! each declaration is interned once into an `Rc` when it is first
//! type-checked, and later references to the same declared name share
//! that `Rc`, so `Rc::ptr_eq` is the identity test.

use std::fmt;
use std::rc::Rc;

/// Fixed-point layouts: integer-backed with a known bit split between
/// integer and fractional bits. `f.8`/`f.16` have no integer part
/// (pure fraction, Q0.8 / Q0.16); the others split as named.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FixedPoint {
    F8_8,
    F16_8,
    F8_16,
    F_8,
    F_16,
}

impl FixedPoint {
    pub fn integer_bits(self) -> u8 {
        match self {
            FixedPoint::F8_8 => 8,
            FixedPoint::F16_8 => 16,
            FixedPoint::F8_16 => 8,
            FixedPoint::F_8 => 0,
            FixedPoint::F_16 => 0,
        }
    }

    pub fn fraction_bits(self) -> u8 {
        match self {
            FixedPoint::F8_8 => 8,
            FixedPoint::F16_8 => 8,
            FixedPoint::F8_16 => 16,
            FixedPoint::F_8 => 8,
            FixedPoint::F_16 => 16,
        }
    }

    /// Total backing storage width in bits; always a multiple of 8.
    pub fn total_bits(self) -> u8 {
        self.integer_bits() + self.fraction_bits()
    }

    pub fn byte_width(self) -> u32 {
        (self.total_bits() as u32) / 8
    }

    pub fn source_name(self) -> &'static str {
        match self {
            FixedPoint::F8_8 => "f8.8",
            FixedPoint::F16_8 => "f16.8",
            FixedPoint::F8_16 => "f8.16",
            FixedPoint::F_8 => "f.8",
            FixedPoint::F_16 => "f.16",
        }
    }

    fn mangle(self) -> &'static str {
        match self {
            FixedPoint::F8_8 => "f8_8",
            FixedPoint::F16_8 => "f16_8",
            FixedPoint::F8_16 => "f8_16",
            FixedPoint::F_8 => "f_8",
            FixedPoint::F_16 => "f_16",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mutability {
    Const,
    Mut,
}

/// A named struct declaration: ordered fields, each with a type.
#[derive(Debug)]
pub struct StructDef {
    pub name: String,
    pub fields: Vec<(String, Type)>,
}

/// A named enum declaration: ordered variants with explicit integer
/// discriminants (assigned 0, 1, 2, … unless given explicitly).
#[derive(Debug)]
pub struct EnumDef {
    pub name: String,
    pub variants: Vec<(String, i64)>,
}

impl EnumDef {
    pub fn discriminant_of(&self, variant: &str) -> Option<i64> {
        self.variants.iter().find(|(n, _)| n == variant).map(|(_, d)| *d)
    }
}

/// A named interface declaration: ordered method signatures.
#[derive(Debug)]
pub struct InterfaceDef {
    pub name: String,
    pub methods: Vec<(String, FunctionSig)>,
}

/// A bit-struct declaration: named fields with explicit bit widths
/// summing to exactly 8 or 16.
#[derive(Debug)]
pub struct BitStructDef {
    pub name: String,
    pub fields: Vec<(String, u8)>,
    pub total_bits: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSig {
    pub params: Vec<Type>,
    pub ret: Type,
}

/// The full MinZ type lattice (spec §3.1).
#[derive(Debug, Clone)]
pub enum Type {
    U8,
    U16,
    U24,
    I8,
    I16,
    I24,
    Bool,
    Void,
    Fixed(FixedPoint),
    Array(Rc<Type>, u32),
    Pointer(Rc<Type>, Mutability),
    Struct(Rc<StructDef>),
    Enum(Rc<EnumDef>),
    Function(Rc<FunctionSig>),
    BitStruct(Rc<BitStructDef>),
    Interface(Rc<InterfaceDef>),
    ErrorUnion(Rc<Type>, Rc<EnumDef>),
    String,
    LString,
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        use Type::*;
        match (self, other) {
            (U8, U8) | (U16, U16) | (U24, U24) | (I8, I8) | (I16, I16) | (I24, I24)
            | (Bool, Bool) | (Void, Void) | (String, String) | (LString, LString) => true,
            (Fixed(a), Fixed(b)) => a == b,
            (Array(a, la), Array(b, lb)) => la == lb && a == b,
            (Pointer(a, ma), Pointer(b, mb)) => ma == mb && a == b,
            (Struct(a), Struct(b)) => Rc::ptr_eq(a, b),
            (Enum(a), Enum(b)) => Rc::ptr_eq(a, b),
            (Interface(a), Interface(b)) => Rc::ptr_eq(a, b),
            (BitStruct(a), BitStruct(b)) => Rc::ptr_eq(a, b),
            (Function(a), Function(b)) => a == b,
            (ErrorUnion(oa, ea), ErrorUnion(ob, eb)) => oa == ob && Rc::ptr_eq(ea, eb),
            _ => false,
        }
    }
}
impl Eq for Type {}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use Type::*;
        match self {
            U8 => write!(f, "u8"),
            U16 => write!(f, "u16"),
            U24 => write!(f, "u24"),
            I8 => write!(f, "i8"),
            I16 => write!(f, "i16"),
            I24 => write!(f, "i24"),
            Bool => write!(f, "bool"),
            Void => write!(f, "void"),
            Fixed(k) => write!(f, "{}", k.source_name()),
            Array(elem, len) => write!(f, "[{len}]{elem}"),
            Pointer(pointee, Mutability::Mut) => write!(f, "*mut {pointee}"),
            Pointer(pointee, Mutability::Const) => write!(f, "*{pointee}"),
            Struct(s) => write!(f, "{}", s.name),
            Enum(e) => write!(f, "{}", e.name),
            Interface(i) => write!(f, "{}", i.name),
            BitStruct(b) => write!(f, "{}", b.name),
            Function(sig) => {
                write!(f, "fun(")?;
                for (i, p) in sig.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{p}")?;
                }
                write!(f, ") -> {}", sig.ret)
            }
            ErrorUnion(ok, err) => write!(f, "{ok}!{}", err.name),
            String => write!(f, "string"),
            LString => write!(f, "lstring"),
        }
    }
}

impl Type {
    pub fn is_integer(&self) -> bool {
        matches!(self, Type::U8 | Type::U16 | Type::U24 | Type::I8 | Type::I16 | Type::I24)
    }

    pub fn is_unsigned(&self) -> bool {
        matches!(self, Type::U8 | Type::U16 | Type::U24)
    }

    pub fn is_signed_int(&self) -> bool {
        matches!(self, Type::I8 | Type::I16 | Type::I24)
    }

    pub fn is_pointer(&self) -> bool {
        matches!(self, Type::Pointer(..))
    }

    /// Width in bytes for types with a fixed storage size; `None` for
    /// `void` and for composites whose width depends on their
    /// elements (callers should compute those structurally).
    pub fn width_bytes(&self) -> Option<u32> {
        match self {
            Type::U8 | Type::I8 | Type::Bool => Some(1),
            Type::U16 | Type::I16 | Type::Pointer(..) => Some(2),
            Type::U24 | Type::I24 => Some(3),
            Type::Void => None,
            Type::Fixed(k) => Some(k.byte_width()),
            Type::Array(elem, len) => elem.width_bytes().map(|w| w * len),
            Type::Struct(s) => {
                let mut total = 0u32;
                for (_, t) in &s.fields {
                    total += t.width_bytes()?;
                }
                Some(total)
            }
            Type::Enum(_) => Some(1),
            Type::BitStruct(b) => Some((b.total_bits as u32) / 8),
            Type::String => None,
            Type::LString => None,
            Type::Function(_) => Some(2),
            Type::Interface(_) => None,
            Type::ErrorUnion(ok, _) => ok.width_bytes(),
        }
    }

    /// The smallest unsigned integer type that can hold `value`
    /// without truncation (§8.3: `255` infers `u8`, `256` infers
    /// `u16`).
    pub fn smallest_unsigned_for(value: u64) -> Type {
        if value <= 0xFF {
            Type::U8
        } else if value <= 0xFFFF {
            Type::U16
        } else if value <= 0xFF_FFFF {
            Type::U24
        } else {
            Type::U16 // clamp: no wider unsigned integer type exists; caller must cast explicitly
        }
    }

    /// The canonical mangling encoding for this type, used as a
    /// component of an overloaded function's emitted symbol (§4.1).
    /// Examples from the specification: `u8`, `p_u8`, `a_u8_16`,
    /// `p_str`.
    pub fn mangle(&self) -> std::string::String {
        use Type::*;
        match self {
            U8 => "u8".into(),
            U16 => "u16".into(),
            U24 => "u24".into(),
            I8 => "i8".into(),
            I16 => "i16".into(),
            I24 => "i24".into(),
            Bool => "bool".into(),
            Void => "void".into(),
            Fixed(k) => k.mangle().into(),
            Array(elem, len) => format!("a_{}_{}", elem.mangle(), len),
            Pointer(pointee, _) => format!("p_{}", pointee.mangle()),
            Struct(s) => s.name.clone(),
            Enum(e) => e.name.clone(),
            Interface(i) => i.name.clone(),
            BitStruct(b) => b.name.clone(),
            Function(sig) => {
                let params: Vec<std::string::String> = sig.params.iter().map(Type::mangle).collect();
                format!("fn_{}_r_{}", params.join("_"), sig.ret.mangle())
            }
            ErrorUnion(ok, err) => format!("e_{}_{}", ok.mangle(), err.name),
            String => "str".into(),
            LString => "lstr".into(),
        }
    }
}

/// The result of checking whether a value of type `from` may be used
/// where a value of type `to` is expected (spec §4.2, §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Assignability {
    /// Identical types; no conversion needed.
    Exact,
    /// `from` widens losslessly into `to` (same signedness, `to` is
    /// no narrower).
    Widening,
    /// Not assignable without an explicit cast.
    No,
}

/// Numeric rank used for widening comparisons, ordered by storage
/// width within a signedness class.
fn int_rank(t: &Type) -> Option<(bool, u32)> {
    match t {
        Type::U8 => Some((false, 1)),
        Type::U16 => Some((false, 2)),
        Type::U24 => Some((false, 3)),
        Type::I8 => Some((true, 1)),
        Type::I16 => Some((true, 2)),
        Type::I24 => Some((true, 3)),
        _ => None,
    }
}

/// Assignability per §4.2/§4.3: exact match, or lossless widening
/// within the same signedness; mixed signedness always requires an
/// explicit cast.
pub fn assignable(from: &Type, to: &Type) -> Assignability {
    if from == to {
        return Assignability::Exact;
    }
    if let (Some((sf, wf)), Some((st, wt))) = (int_rank(from), int_rank(to)) {
        if sf == st && wf <= wt {
            return Assignability::Widening;
        }
    }
    Assignability::No
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mangle_primitives_and_composites() {
        assert_eq!(Type::U8.mangle(), "u8");
        let p = Type::Pointer(Rc::new(Type::U8), Mutability::Const);
        assert_eq!(p.mangle(), "p_u8");
        let a = Type::Array(Rc::new(Type::U8), 16);
        assert_eq!(a.mangle(), "a_u8_16");
        assert_eq!(Type::String.mangle(), "str");
        let ps = Type::Pointer(Rc::new(Type::String), Mutability::Const);
        assert_eq!(ps.mangle(), "p_str");
    }

    #[test]
    fn nominal_equality_is_identity() {
        let a = Rc::new(StructDef { name: "Point".into(), fields: vec![] });
        let b = Rc::new(StructDef { name: "Point".into(), fields: vec![] });
        assert_eq!(Type::Struct(a.clone()), Type::Struct(a));
        assert_ne!(Type::Struct(b.clone()), Type::Struct(Rc::new(StructDef { name: "Point".into(), fields: vec![] })));
        let _ = b;
    }

    #[test]
    fn widening_respects_signedness() {
        assert_eq!(assignable(&Type::U8, &Type::U16), Assignability::Widening);
        assert_eq!(assignable(&Type::U16, &Type::U8), Assignability::No);
        assert_eq!(assignable(&Type::U8, &Type::I8), Assignability::No);
        assert_eq!(assignable(&Type::U8, &Type::U8), Assignability::Exact);
    }

    #[test]
    fn literal_inference_boundaries() {
        assert_eq!(Type::smallest_unsigned_for(255), Type::U8);
        assert_eq!(Type::smallest_unsigned_for(256), Type::U16);
    }
}
