//! Tipos fundamentais do modelo de medição.
//!
//! Um ponto de medição é uma tupla nomeada de campos tipados; cada campo tem
//! um [`FieldType`] fixo e cada injeção carrega um [`Value`] por campo, na
//! ordem de declaração.

use std::fmt;

/// Domínio padrão de canais; canais sem domínio explícito vivem aqui.
pub const DEFAULT_DOMAIN: &str = "default";

// ──────────────────────────────────────────────
// Tipos de campo
// ──────────────────────────────────────────────

/// Tipo de um campo de medição. Conjunto fechado: acrescentar um tipo é uma
/// mudança incompatível de schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Int32,
    Int64,
    UInt32,
    UInt64,
    Double,
}

impl FieldType {
    /// Nome do tipo no fio (coluna `campo:tipo` da linha de schema).
    pub fn wire_name(self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Int32 => "int32",
            FieldType::Int64 => "int64",
            FieldType::UInt32 => "uint32",
            FieldType::UInt64 => "uint64",
            FieldType::Double => "double",
        }
    }

    /// Interpreta um nome de tipo vindo do fio. Aceita o apelido legado
    /// `long` para `int32`.
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(FieldType::String),
            "int32" | "long" => Some(FieldType::Int32),
            "int64" => Some(FieldType::Int64),
            "uint32" => Some(FieldType::UInt32),
            "uint64" => Some(FieldType::UInt64),
            "double" => Some(FieldType::Double),
            _ => None,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.wire_name())
    }
}

/// Um campo declarado: nome + tipo. A ordem de declaração dentro de um ponto
/// de medição é a ordem das colunas no fio.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub ftype: FieldType,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, ftype: FieldType) -> Self {
        Self {
            name: name.into(),
            ftype,
        }
    }
}

// ──────────────────────────────────────────────
// Valores
// ──────────────────────────────────────────────

/// Valor de um campo em uma injeção. Cada variante corresponde a um
/// [`FieldType`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Str(String),
    Int32(i32),
    Int64(i64),
    UInt32(u32),
    UInt64(u64),
    Double(f64),
}

impl Value {
    /// Tipo de campo correspondente a este valor.
    pub fn field_type(&self) -> FieldType {
        match self {
            Value::Str(_) => FieldType::String,
            Value::Int32(_) => FieldType::Int32,
            Value::Int64(_) => FieldType::Int64,
            Value::UInt32(_) => FieldType::UInt32,
            Value::UInt64(_) => FieldType::UInt64,
            Value::Double(_) => FieldType::Double,
        }
    }
}

impl fmt::Display for Value {
    /// Renderização no fio: inteiros em decimal, doubles na forma mais curta
    /// que preserva o valor, strings verbatim.
    ///
    /// Strings não são escapadas: TAB ou quebra de linha embutidos corrompem
    /// o enquadramento da linha. Limitação conhecida do formato de texto,
    /// mantida para compatibilidade com coletores existentes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => f.write_str(s),
            Value::Int32(v) => write!(f, "{v}"),
            Value::Int64(v) => write!(f, "{v}"),
            Value::UInt32(v) => write!(f, "{v}"),
            Value::UInt64(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v:?}"),
        }
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int32(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int64(v)
    }
}

impl From<u32> for Value {
    fn from(v: u32) -> Self {
        Value::UInt32(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::UInt64(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

// ──────────────────────────────────────────────
// Chave de canal
// ──────────────────────────────────────────────

/// Identifica um canal de entrega: (nome, domínio). O mesmo nome pode
/// existir em domínios diferentes e resolve para canais distintos.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelKey {
    pub name: String,
    pub domain: String,
}

impl ChannelKey {
    pub fn new(name: impl Into<String>, domain: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            domain: domain.into(),
        }
    }

    /// Chave no domínio padrão.
    pub fn in_default(name: impl Into<String>) -> Self {
        Self::new(name, DEFAULT_DOMAIN)
    }
}

impl fmt::Display for ChannelKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.domain)
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
