//! Registro de canais por (nome, domínio).
//!
//! O registro é o dono exclusivo de todos os [`Channel`] de um cliente.
//! Criação é idempotente sob o lock do mapa: o primeiro chamador vence,
//! chamadas idênticas devolvem o canal existente e URL conflitante é erro de
//! configuração.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::channel::Channel;
use crate::error::{Error, Result};
use crate::types::{ChannelKey, DEFAULT_DOMAIN};

/// Tabela de canais vivos de um cliente.
#[derive(Default)]
pub struct ChannelRegistry {
    channels: Mutex<HashMap<ChannelKey, Arc<Channel>>>,
}

impl ChannelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cria (ou devolve) o canal com a chave dada. Recriar com a mesma URL é
    /// idempotente; URL diferente é erro de configuração.
    pub fn create(&self, name: &str, url: &str, domain: &str) -> Result<Arc<Channel>> {
        let key = ChannelKey::new(name, domain);
        let mut map = self.lock();
        if let Some(existing) = map.get(&key) {
            if existing.url() != url {
                return Err(Error::Config(format!(
                    "canal '{key}' já definido com URL diferente ('{}' vs '{url}')",
                    existing.url()
                )));
            }
            return Ok(Arc::clone(existing));
        }
        let channel = Arc::new(Channel::open(key.clone(), url)?);
        map.insert(key, Arc::clone(&channel));
        Ok(channel)
    }

    /// Resolve um canal existente. Se o domínio pedido não existe mas o nome
    /// existe no domínio padrão, clona o canal padrão preguiçosamente para o
    /// domínio pedido, com a mesma URL.
    pub fn resolve(&self, name: &str, domain: &str) -> Result<Arc<Channel>> {
        let default_url = {
            let map = self.lock();
            if let Some(channel) = map.get(&ChannelKey::new(name, domain)) {
                return Ok(Arc::clone(channel));
            }
            if domain == DEFAULT_DOMAIN {
                None
            } else {
                map.get(&ChannelKey::in_default(name))
                    .map(|c| c.url().to_string())
            }
        };
        match default_url {
            Some(url) => self.create(name, &url, domain),
            None => Err(Error::Lookup(format!("{name}:{domain}"))),
        }
    }

    /// Busca sem efeito colateral (sem clonagem de domínio).
    pub fn get(&self, name: &str, domain: &str) -> Option<Arc<Channel>> {
        self.lock().get(&ChannelKey::new(name, domain)).cloned()
    }

    /// Instantâneo de todos os canais vivos.
    pub fn all(&self) -> Vec<Arc<Channel>> {
        self.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Fecha todos os canais, drenando cada fila antes de fechar o sink.
    pub fn close_all(&self) {
        for channel in self.all() {
            channel.close();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<ChannelKey, Arc<Channel>>> {
        self.channels.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn file_url(dir: &tempfile::TempDir, name: &str) -> String {
        format!("file:{}", dir.path().join(name).display())
    }

    #[test]
    fn create_is_idempotent_for_same_url() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ChannelRegistry::new();
        let url = file_url(&dir, "a.log");

        let first = registry.create("default", &url, DEFAULT_DOMAIN).unwrap();
        let second = registry.create("default", &url, DEFAULT_DOMAIN).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
        registry.close_all();
    }

    #[test]
    fn redefinition_with_different_url_fails() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ChannelRegistry::new();

        registry
            .create("default", &file_url(&dir, "a.log"), DEFAULT_DOMAIN)
            .unwrap();
        let result = registry.create("default", &file_url(&dir, "b.log"), DEFAULT_DOMAIN);
        assert!(matches!(result, Err(Error::Config(_))));
        registry.close_all();
    }

    #[test]
    fn resolve_unknown_channel_fails() {
        let registry = ChannelRegistry::new();
        assert!(matches!(
            registry.resolve("fantasma", DEFAULT_DOMAIN),
            Err(Error::Lookup(_))
        ));
    }

    #[test]
    fn resolve_clones_default_domain_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ChannelRegistry::new();
        let url = file_url(&dir, "a.log");

        let base = registry.create("default", &url, DEFAULT_DOMAIN).unwrap();
        let cloned = registry.resolve("default", "expA").unwrap();

        assert!(!Arc::ptr_eq(&base, &cloned));
        assert_eq!(cloned.url(), base.url());
        assert_eq!(cloned.key().domain, "expA");
        assert_eq!(registry.len(), 2);
        registry.close_all();
    }

    #[test]
    fn clone_into_domain_does_not_repeat() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ChannelRegistry::new();
        let url = file_url(&dir, "a.log");

        registry.create("default", &url, DEFAULT_DOMAIN).unwrap();
        let first = registry.resolve("default", "expA").unwrap();
        let second = registry.resolve("default", "expA").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        registry.close_all();
    }

    #[test]
    fn get_has_no_side_effects() {
        let dir = tempfile::tempdir().unwrap();
        let registry = ChannelRegistry::new();
        registry
            .create("default", &file_url(&dir, "a.log"), DEFAULT_DOMAIN)
            .unwrap();

        assert!(registry.get("default", "expA").is_none());
        assert_eq!(registry.len(), 1);
        registry.close_all();
    }
}
