//! Configuração do cliente via TOML.
//!
//! É o registro de fronteira que a camada externa (CLI, orquestrador) deve
//! produzir antes de ativar a coleta: domínio, identificador do nó,
//! identificador da aplicação, URLs de canal e a flag de no-op.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::channel::SinkAddr;

/// Um canal declarado na configuração. Canais de configuração vivem sempre no
/// domínio padrão.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Nome do canal ("default" recebe os pontos sem vínculo explícito)
    pub name: String,
    /// URL do sink: `file:<caminho>`, `file:-` (stdout) ou `tcp:<host>[:<porta>]`
    pub url: String,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            name: "default".into(),
            url: String::new(),
        }
    }
}

/// Configuração do cliente de medição.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Domínio (identificador do experimento) — obrigatório
    pub domain: String,
    /// Identificador do nó remetente — obrigatório
    pub node_id: String,
    /// Identificador da aplicação — obrigatório; prefixa os nomes de schema
    pub app_name: String,
    /// Canais de entrega declarados
    pub channels: Vec<ChannelConfig>,
    /// Modo no-op: nenhum canal é aberto e toda injeção vira eco de debug
    pub noop: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            node_id: String::new(),
            app_name: String::new(),
            channels: Vec::new(),
            noop: false,
        }
    }
}

impl ClientConfig {
    /// Carrega configuração de um arquivo TOML.
    pub fn load(path: &Path) -> Self {
        if path.exists() {
            match std::fs::read_to_string(path) {
                Ok(content) => match toml::from_str::<ClientConfig>(&content) {
                    Ok(config) => {
                        info!("Configuração carregada de {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        warn!("Erro ao parsear {}: {}", path.display(), e);
                    }
                },
                Err(e) => {
                    warn!("Erro ao ler {}: {}", path.display(), e);
                }
            }
        }

        info!("Usando configuração padrão");
        ClientConfig::default()
    }

    /// Salva configuração em arquivo TOML.
    pub fn save(&self, path: &Path) -> Result<(), String> {
        let content = toml::to_string_pretty(self).map_err(|e| e.to_string())?;
        std::fs::write(path, content).map_err(|e| e.to_string())?;
        info!("Configuração salva em {}", path.display());
        Ok(())
    }

    /// Retorna o caminho padrão do config.toml.
    pub fn default_path() -> PathBuf {
        let exe_dir = std::env::current_exe()
            .map(|p| p.parent().unwrap_or(Path::new(".")).to_path_buf())
            .unwrap_or_else(|_| PathBuf::from("."));
        exe_dir.join("config.toml")
    }

    /// Valida a configuração e retorna lista de erros. Em modo no-op nada é
    /// obrigatório: nenhum canal será aberto.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.noop {
            return errors;
        }

        if self.domain.is_empty() {
            errors.push("Valor obrigatório ausente: domain".into());
        }
        if self.node_id.is_empty() {
            errors.push("Valor obrigatório ausente: node_id".into());
        }
        if self.app_name.is_empty() {
            errors.push("Valor obrigatório ausente: app_name".into());
        }

        for (i, channel) in self.channels.iter().enumerate() {
            if channel.name.is_empty() {
                errors.push(format!("Canal com URL '{}' sem nome", channel.url));
            }
            if let Err(e) = SinkAddr::parse(&channel.url) {
                errors.push(e.to_string());
            }
            if self.channels[..i].iter().any(|c| c.name == channel.name) {
                errors.push(format!("Canal '{}' declarado duas vezes", channel.name));
            }
        }

        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ClientConfig {
        ClientConfig {
            domain: "expA".into(),
            node_id: "n1".into(),
            app_name: "app1".into(),
            channels: vec![ChannelConfig {
                name: "default".into(),
                url: "file:-".into(),
            }],
            noop: false,
        }
    }

    #[test]
    fn valid_config_has_no_errors() {
        let errors = valid_config().validate();
        assert!(errors.is_empty(), "Erros: {:?}", errors);
    }

    #[test]
    fn default_config_is_incomplete() {
        let errors = ClientConfig::default().validate();
        assert_eq!(errors.len(), 3); // domain, node_id, app_name
    }

    #[test]
    fn noop_config_needs_nothing() {
        let config = ClientConfig {
            noop: true,
            ..ClientConfig::default()
        };
        assert!(config.validate().is_empty());
    }

    #[test]
    fn bad_url_is_detected() {
        let mut config = valid_config();
        config.channels[0].url = "udp:host:1234".into();
        let errors = config.validate();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("transporte desconhecido"));
    }

    #[test]
    fn duplicate_channel_name_is_detected() {
        let mut config = valid_config();
        config.channels.push(ChannelConfig {
            name: "default".into(),
            url: "file:-".into(),
        });
        let errors = config.validate();
        assert!(errors.iter().any(|e| e.contains("duas vezes")));
    }

    #[test]
    fn roundtrip_toml() {
        let config = valid_config();
        let toml_str = toml::to_string_pretty(&config).unwrap();
        let parsed: ClientConfig = toml::from_str(&toml_str).unwrap();
        assert_eq!(config.domain, parsed.domain);
        assert_eq!(config.channels[0].url, parsed.channels[0].url);
    }

    #[test]
    fn partial_toml_uses_defaults() {
        let partial = r#"
domain = "expA"

[[channels]]
url = "file:-"
"#;
        let config: ClientConfig = toml::from_str(partial).unwrap();
        assert_eq!(config.domain, "expA");
        // Campos omitidos devem ter valor padrão
        assert_eq!(config.channels[0].name, "default");
        assert!(!config.noop);
        assert!(config.node_id.is_empty());
    }
}
