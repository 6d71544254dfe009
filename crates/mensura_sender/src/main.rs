//! # Mensura Sender
//!
//! Gerador de medições sintéticas que demonstra a biblioteca `mensura_core`:
//! declara dois pontos de medição (`sin` e `cos`), ativa a coleta e injeta
//! amostras em intervalo fixo até completar a quantidade configurada.
//!
//! Toda a configuração vem do `config.toml` ao lado do executável (criado com
//! valores padrão na primeira execução). O destino padrão é `file:-`
//! (stdout); aponte o canal para `tcp:<host>:<porta>` para enviar a um
//! servidor de coleta.

use mensura_core::{ChannelConfig, Client, ClientConfig, FieldType, Value};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Configuração do gerador.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
struct SenderConfig {
    /// Configuração do cliente de medição
    client: ClientConfig,
    /// Quantidade de amostras a injetar
    samples: u32,
    /// Intervalo entre amostras (segundos)
    interval_secs: f64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            client: ClientConfig {
                domain: "demo".into(),
                node_id: "n1".into(),
                app_name: "gerador".into(),
                channels: vec![ChannelConfig {
                    name: "default".into(),
                    url: "file:-".into(),
                }],
                noop: false,
            },
            samples: 20,
            interval_secs: 0.5,
        }
    }
}

fn load_config(path: &Path) -> SenderConfig {
    if path.exists() {
        match std::fs::read_to_string(path) {
            Ok(content) => match toml::from_str::<SenderConfig>(&content) {
                Ok(config) => {
                    info!("Configuração carregada de {}", path.display());
                    return config;
                }
                Err(e) => warn!("Erro ao parsear {}: {}", path.display(), e),
            },
            Err(e) => warn!("Erro ao ler {}: {}", path.display(), e),
        }
    }

    info!("Usando configuração padrão");
    SenderConfig::default()
}

fn save_config(config: &SenderConfig, path: &Path) -> Result<(), String> {
    let content = toml::to_string_pretty(config).map_err(|e| e.to_string())?;
    std::fs::write(path, content).map_err(|e| e.to_string())?;
    Ok(())
}

fn main() {
    // ── Logging ──
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // ── Carregar config ──
    let config_path = ClientConfig::default_path();
    let config = load_config(&config_path);

    // Salva config padrão se não existir
    if !config_path.exists() {
        if let Err(e) = save_config(&config, &config_path) {
            warn!("Não foi possível salvar config padrão: {e}");
        }
    }

    let destinos: Vec<String> = config
        .client
        .channels
        .iter()
        .map(|c| c.url.clone())
        .collect();

    // ── Banner ──
    println!();
    println!("══════════════════════════════════════════════");
    println!("   📐 MENSURA SENDER – GERADOR ATIVO");
    println!("══════════════════════════════════════════════");
    println!("  Destino:   {}", destinos.join(", "));
    println!("  Amostras:  {}", config.samples);
    println!("  Intervalo: {:.1}s", config.interval_secs);
    println!("  Protocolo: text v{}", mensura_core::PROTOCOL_VERSION);
    println!("══════════════════════════════════════════════");
    println!();

    if let Err(e) = run(config) {
        error!("Gerador abortado: {e}");
        std::process::exit(1);
    }
}

fn run(config: SenderConfig) -> mensura_core::Result<()> {
    let mut client = Client::new(config.client)?;

    let sin = client
        .define("sin")
        .field("label", FieldType::String)
        .field("angle", FieldType::Int32)
        .field("value", FieldType::Double)
        .register()?;
    let cos = client
        .define("cos")
        .field("label", FieldType::String)
        .field("value", FieldType::Double)
        .register()?;

    client.start()?;

    let interval = Duration::from_secs_f64(config.interval_secs);

    // ── Loop principal ──
    for i in 0..config.samples {
        let cycle_start = Instant::now();

        let angle = (15 * i) as i32;
        let rad = f64::from(angle).to_radians();
        client.inject(
            sin,
            &[
                Value::from(format!("amostra_{angle}")),
                Value::from(angle),
                Value::from(rad.sin()),
            ],
        )?;
        client.inject(
            cos,
            &[Value::from(format!("amostra_{angle}")), Value::from(rad.cos())],
        )?;
        info!("→ amostra {}/{} (ângulo {angle}°)", i + 1, config.samples);

        // Dormir pelo tempo restante do intervalo
        let elapsed = cycle_start.elapsed();
        if elapsed < interval {
            std::thread::sleep(interval - elapsed);
        }
    }

    client.close();
    Ok(())
}
