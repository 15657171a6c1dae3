//! Value types and function signatures.

use std::fmt;

/// The type of an SSA value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Type {
    /// No value; only valid as an instruction or function result type.
    Void,
    /// Integer of the given bit width (1, 8, 16, 32 or 64).
    Int(u8),
    /// Opaque pointer.
    Ptr,
}

impl Type {
    pub const I1: Type = Type::Int(1);
    pub const I8: Type = Type::Int(8);
    pub const I16: Type = Type::Int(16);
    pub const I32: Type = Type::Int(32);
    pub const I64: Type = Type::Int(64);

    pub fn is_void(self) -> bool {
        self == Type::Void
    }

    pub fn is_int(self) -> bool {
        matches!(self, Type::Int(_))
    }

    /// Bit width of an integer type.
    pub fn int_width(self) -> Option<u32> {
        match self {
            Type::Int(bits) => Some(u32::from(bits)),
            _ => None,
        }
    }

    /// Mask `bits` down to the width of this integer type.
    ///
    /// Non-integer types are returned unchanged.
    pub fn mask(self, bits: u64) -> u64 {
        match self.int_width() {
            Some(64) | None => bits,
            Some(width) => bits & ((1u64 << width) - 1),
        }
    }

    /// Interpret masked `bits` as a signed integer of this type's width.
    pub fn sign_extend(self, bits: u64) -> i64 {
        match self.int_width() {
            Some(width) if width < 64 => {
                let shift = 64 - width;
                ((bits << shift) as i64) >> shift
            }
            _ => bits as i64,
        }
    }

    /// Parse a type keyword (`void`, `i32`, `ptr`, ...).
    pub fn from_keyword(word: &str) -> Option<Type> {
        match word {
            "void" => Some(Type::Void),
            "ptr" => Some(Type::Ptr),
            "i1" => Some(Type::I1),
            "i8" => Some(Type::I8),
            "i16" => Some(Type::I16),
            "i32" => Some(Type::I32),
            "i64" => Some(Type::I64),
            _ => None,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Void => f.write_str("void"),
            Type::Int(bits) => write!(f, "i{bits}"),
            Type::Ptr => f.write_str("ptr"),
        }
    }
}

/// A function type: parameters, result, and whether extra arguments are accepted.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Signature {
    pub params: Vec<Type>,
    pub ret: Type,
    pub variadic: bool,
}

impl Signature {
    pub fn new(params: impl IntoIterator<Item = Type>, ret: Type) -> Self {
        Self {
            params: params.into_iter().collect(),
            ret,
            variadic: false,
        }
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Whether a call with `count` arguments is well-formed for this signature.
    pub fn accepts_arg_count(&self, count: usize) -> bool {
        if self.variadic {
            count >= self.params.len()
        } else {
            count == self.params.len()
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (", self.ret)?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{param}")?;
        }
        if self.variadic {
            if !self.params.is_empty() {
                f.write_str(", ")?;
            }
            f.write_str("...")?;
        }
        f.write_str(")")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_and_sign_extend() {
        assert_eq!(Type::I8.mask(0x1ff), 0xff);
        assert_eq!(Type::I8.sign_extend(0xff), -1);
        assert_eq!(Type::I32.sign_extend(Type::I32.mask(u64::MAX)), -1);
        assert_eq!(Type::I64.mask(u64::MAX), u64::MAX);
        assert_eq!(Type::I1.mask(3), 1);
    }

    #[test]
    fn keywords_round_trip() {
        for ty in [Type::Void, Type::Ptr, Type::I1, Type::I8, Type::I16, Type::I32, Type::I64] {
            assert_eq!(Type::from_keyword(&ty.to_string()), Some(ty));
        }
        assert_eq!(Type::from_keyword("i7"), None);
    }

    #[test]
    fn signature_arity() {
        let sig = Signature::new([Type::I32], Type::I32);
        assert!(sig.accepts_arg_count(1));
        assert!(!sig.accepts_arg_count(2));

        let sig = sig.variadic();
        assert!(sig.accepts_arg_count(3));
        assert!(!sig.accepts_arg_count(0));
        assert_eq!(sig.to_string(), "i32 (i32, ...)");
    }
}
