//! Erros da biblioteca.
//!
//! Erros de configuração, declaração, validação e consulta são síncronos e
//! devolvidos no ponto da chamada ofensora. Falhas de E/S dentro da thread de
//! entrega de um canal **não** aparecem aqui: são registradas no log e
//! refletidas no estado de saúde do canal ([`crate::channel::Health`]).

use thiserror::Error;

/// Erro da biblioteca.
#[derive(Debug, Error)]
pub enum Error {
    /// URL inválida, canal redefinido com URL diferente ou parâmetro
    /// obrigatório ausente.
    #[error("erro de configuração: {0}")]
    Config(String),

    /// Declaração de ponto de medição inválida ou feita depois do freeze.
    #[error("erro de declaração: {0}")]
    Declaration(String),

    /// Medição injetada não corresponde ao schema declarado.
    #[error("medição inválida para '{mp}': {reason}")]
    Validation { mp: String, reason: String },

    /// Referência a um canal que não existe.
    #[error("canal desconhecido '{0}'")]
    Lookup(String),

    /// Uso de um canal depois de fechado.
    #[error("canal '{0}' já fechado")]
    ClosedChannel(String),

    /// Linha de protocolo que não segue a gramática do fio.
    #[error("linha de protocolo inválida: {0}")]
    Parse(String),

    /// Falha de E/S na abertura síncrona de um sink.
    #[error("erro de E/S: {0}")]
    Io(#[from] std::io::Error),
}

/// Alias de resultado da biblioteca.
pub type Result<T> = std::result::Result<T, Error>;
