//! Protocolo de texto orientado a linhas do servidor de coleta.
//!
//! Um fluxo começa com o preâmbulo de seis linhas, seguido de uma linha de
//! schema por ponto de medição e de uma linha em branco que separa o
//! cabeçalho das linhas de dados:
//!
//! ```text
//! protocol: 1
//! experiment-id: <domínio>
//! start_time: <epoch em segundos>
//! sender-id: <id do nó>
//! app-name: <id da aplicação>
//! content: text
//! schema: <índice> <nome> <campo>:<tipo> [<campo>:<tipo> ...]
//!
//! <decorrido>\t<índice>\t<seq>\t<valor>[\t<valor>...]
//! ```
//!
//! Valores de dados são separados por TAB, sem escape: TAB ou quebra de linha
//! dentro de um campo string corrompem o enquadramento (limitação conhecida
//! do formato).

use crate::error::{Error, Result};
use crate::types::{FieldDef, FieldType, Value};

/// Versão do protocolo de texto.
pub const PROTOCOL_VERSION: u32 = 1;

/// Porta padrão do servidor de coleta (URLs `tcp:` sem porta explícita).
pub const DEFAULT_SERVER_PORT: u16 = 3003;

// ──────────────────────────────────────────────
// Codificação
// ──────────────────────────────────────────────

/// Monta as seis linhas do preâmbulo do protocolo, na ordem exigida.
pub fn header_lines(domain: &str, node_id: &str, app_name: &str, start_epoch: u64) -> [String; 6] {
    [
        format!("protocol: {PROTOCOL_VERSION}"),
        format!("experiment-id: {domain}"),
        format!("start_time: {start_epoch}"),
        format!("sender-id: {node_id}"),
        format!("app-name: {app_name}"),
        "content: text".to_string(),
    ]
}

/// Monta a linha de schema de um ponto de medição.
pub fn schema_line(index: u32, mp_name: &str, fields: &[FieldDef]) -> String {
    let mut line = format!("schema: {index} {mp_name}");
    for field in fields {
        line.push(' ');
        line.push_str(&field.name);
        line.push(':');
        line.push_str(field.ftype.wire_name());
    }
    line
}

/// Monta uma linha de dados: tempo decorrido, índice de schema, número de
/// sequência e um valor por campo, separados por TAB.
pub fn data_line(elapsed_secs: f64, schema_index: u32, seq_no: u64, values: &[Value]) -> String {
    let mut line = format!("{elapsed_secs:.6}\t{schema_index}\t{seq_no}");
    for value in values {
        line.push('\t');
        line.push_str(&value.to_string());
    }
    line
}

// ──────────────────────────────────────────────
// Decodificação
// ──────────────────────────────────────────────

/// Declaração de schema reconstruída de uma linha `schema:`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDecl {
    pub index: u32,
    pub mp_name: String,
    pub fields: Vec<FieldDef>,
}

impl SchemaDecl {
    /// Interpreta uma linha `schema: <índice> <nome> <campo>:<tipo> ...`.
    pub fn parse(line: &str) -> Result<Self> {
        let rest = line
            .trim_end()
            .strip_prefix("schema:")
            .ok_or_else(|| Error::Parse(format!("linha de schema sem prefixo 'schema:': '{line}'")))?;

        let mut parts = rest.split_whitespace();
        let index = parts
            .next()
            .ok_or_else(|| Error::Parse("linha de schema sem índice".into()))?
            .parse::<u32>()
            .map_err(|_| Error::Parse(format!("índice de schema inválido em '{line}'")))?;
        let mp_name = parts
            .next()
            .ok_or_else(|| Error::Parse("linha de schema sem nome de ponto".into()))?
            .to_string();

        let mut fields = Vec::new();
        for entry in parts {
            let (name, type_name) = entry
                .split_once(':')
                .ok_or_else(|| Error::Parse(format!("campo sem tipo em '{entry}'")))?;
            let ftype = FieldType::parse(type_name)
                .ok_or_else(|| Error::Parse(format!("tipo de campo desconhecido '{type_name}'")))?;
            fields.push(FieldDef::new(name, ftype));
        }
        if fields.is_empty() {
            return Err(Error::Parse(format!("schema '{mp_name}' sem campos")));
        }

        Ok(Self {
            index,
            mp_name,
            fields,
        })
    }
}

/// Uma medição reconstruída de uma linha de dados, com valores nomeados na
/// ordem de declaração do schema.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub elapsed: f64,
    pub schema_index: u32,
    pub seq_no: u64,
    pub values: Vec<(String, Value)>,
}

/// Decodifica uma linha de dados contra o schema que ela referencia.
pub fn decode_data_line(schema: &SchemaDecl, line: &str) -> Result<Sample> {
    let mut cols = line.trim_end_matches(['\n', '\r']).split('\t');

    let elapsed = next_col(&mut cols, "tempo decorrido")?
        .parse::<f64>()
        .map_err(|_| Error::Parse(format!("tempo decorrido inválido em '{line}'")))?;
    let schema_index = next_col(&mut cols, "índice de schema")?
        .parse::<u32>()
        .map_err(|_| Error::Parse(format!("índice de schema inválido em '{line}'")))?;
    if schema_index != schema.index {
        return Err(Error::Parse(format!(
            "linha referencia o schema {schema_index}, esperado {}",
            schema.index
        )));
    }
    let seq_no = next_col(&mut cols, "número de sequência")?
        .parse::<u64>()
        .map_err(|_| Error::Parse(format!("número de sequência inválido em '{line}'")))?;

    let raw: Vec<&str> = cols.collect();
    if raw.len() != schema.fields.len() {
        return Err(Error::Parse(format!(
            "{} coluna(s) de dados, {} campo(s) no schema '{}'",
            raw.len(),
            schema.fields.len(),
            schema.mp_name
        )));
    }

    let mut values = Vec::with_capacity(raw.len());
    for (field, col) in schema.fields.iter().zip(raw) {
        values.push((field.name.clone(), parse_value(field.ftype, col)?));
    }

    Ok(Sample {
        elapsed,
        schema_index,
        seq_no,
        values,
    })
}

fn next_col<'a>(cols: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<&'a str> {
    cols.next()
        .ok_or_else(|| Error::Parse(format!("coluna ausente: {what}")))
}

fn parse_value(ftype: FieldType, raw: &str) -> Result<Value> {
    let bad = || Error::Parse(format!("valor '{raw}' inválido para o tipo {ftype}"));
    let value = match ftype {
        FieldType::String => Value::Str(raw.to_string()),
        FieldType::Int32 => Value::Int32(raw.parse().map_err(|_| bad())?),
        FieldType::Int64 => Value::Int64(raw.parse().map_err(|_| bad())?),
        FieldType::UInt32 => Value::UInt32(raw.parse().map_err(|_| bad())?),
        FieldType::UInt64 => Value::UInt64(raw.parse().map_err(|_| bad())?),
        FieldType::Double => Value::Double(raw.parse().map_err(|_| bad())?),
    };
    Ok(value)
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
