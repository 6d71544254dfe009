//! # Mensura Core
//!
//! Biblioteca cliente de relato de medições: a aplicação declara pontos de
//! medição tipados (tuplas nomeadas de campos) e a biblioteca serializa cada
//! injeção para um ou mais canais de entrega (conexão TCP ou arquivo local)
//! usando um protocolo de texto versionado, orientado a linhas, entendido
//! pelo servidor de coleta.
//!
//! ## Módulos
//! - [`types`] – Tipos de campo, valores e chaves de canal
//! - [`protocol`] – Codificação/decodificação do protocolo de texto
//! - [`config`] – Configuração do cliente via TOML
//! - [`error`] – Erros da biblioteca
//! - [`channel`] – Canal de entrega: sink, fila e thread de escrita
//! - [`registry`] – Registro de canais por (nome, domínio)
//! - [`client`] – Contexto do cliente: declaração, freeze e injeção
//!
//! ## Uso
//! ```no_run
//! use mensura_core::{ChannelConfig, Client, ClientConfig, FieldType, Value};
//!
//! let config = ClientConfig {
//!     domain: "expA".into(),
//!     node_id: "n1".into(),
//!     app_name: "app1".into(),
//!     channels: vec![ChannelConfig { name: "default".into(), url: "file:-".into() }],
//!     noop: false,
//! };
//!
//! let mut client = Client::new(config)?;
//! let sin = client
//!     .define("sin")
//!     .field("label", FieldType::String)
//!     .field("angle", FieldType::Int32)
//!     .field("value", FieldType::Double)
//!     .register()?;
//!
//! client.start()?;
//! client.inject(sin, &[Value::from("label_0"), Value::from(0i32), Value::from(0.0f64)])?;
//! client.close();
//! # Ok::<(), mensura_core::Error>(())
//! ```

pub mod channel;
pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod types;

// Re-exports convenientes
pub use channel::Health;
pub use client::{Client, MpBuilder, MpHandle};
pub use config::{ChannelConfig, ClientConfig};
pub use error::{Error, Result};
pub use protocol::{DEFAULT_SERVER_PORT, PROTOCOL_VERSION};
pub use types::{DEFAULT_DOMAIN, FieldDef, FieldType, Value};
