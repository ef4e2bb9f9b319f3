#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Type {
    #[default]
    Void,
    Int32,
    Int64,
}

impl Type {
    pub const fn is_int(self) -> bool {
        matches!(self, Type::Int32 | Type::Int64)
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Void => write!(f, "Void"),
            Type::Int32 => write!(f, "Int32"),
            Type::Int64 => write!(f, "Int64"),
        }
    }
}
