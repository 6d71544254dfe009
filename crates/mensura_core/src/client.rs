//! Contexto do cliente: declaração de pontos de medição, freeze e injeção.
//!
//! O [`Client`] é um objeto de escopo de processo explícito (sem estado
//! global), o que permite instâncias independentes no mesmo processo.
//! Ciclo de vida:
//!
//! 1. **Declaração** — [`Client::define`] constrói pontos de medição com um
//!    builder; [`Client::create_channel`] declara canais nomeados.
//! 2. **Freeze** — [`Client::start`] resolve os vínculos, abre canais e emite
//!    cabeçalhos e linhas de schema. Depois disso nenhuma declaração é aceita.
//! 3. **Injeção** — [`Client::inject`] valida, carimba e enfileira cada
//!    medição em todos os canais vinculados.
//! 4. **Encerramento** — [`Client::close`] drena e fecha todos os canais.
//!
//! Antes do `start` (ou em modo no-op) `inject` ecoa a medição no log de
//! debug e retorna sem erro: é o modo desativado documentado.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

use crate::channel::{Channel, Health};
use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::protocol;
use crate::registry::ChannelRegistry;
use crate::types::{ChannelKey, DEFAULT_DOMAIN, FieldDef, FieldType, Value};

/// Identificador opaco de um ponto de medição registrado em um [`Client`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MpHandle(usize);

/// Estado mutável de um ponto: contador de sequência e saídas resolvidas.
#[derive(Default)]
struct MpState {
    seq_no: u64,
    /// (canal, índice de schema naquele canal), preenchido no freeze
    outputs: Vec<(Arc<Channel>, u32)>,
}

/// Um ponto de medição declarado.
struct MeasurePoint {
    name: String,
    fields: Vec<FieldDef>,
    bindings: Vec<ChannelKey>,
    state: Mutex<MpState>,
}

/// Contexto do cliente de medição.
pub struct Client {
    config: ClientConfig,
    registry: ChannelRegistry,
    points: Vec<MeasurePoint>,
    started: bool,
    /// (relógio monotônico, epoch em segundos) capturados no start; `None`
    /// enquanto a coleta está inativa (antes do start ou em modo no-op).
    start: Option<(Instant, u64)>,
}

impl Client {
    /// Cria um cliente a partir da configuração. Fora do modo no-op, os
    /// valores obrigatórios (domain, node_id, app_name) e as URLs de canal
    /// são validados aqui.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            return Err(Error::Config(errors.join("; ")));
        }
        Ok(Self {
            config,
            registry: ChannelRegistry::new(),
            points: Vec::new(),
            started: false,
            start: None,
        })
    }

    /// Começa a declaração de um ponto de medição.
    pub fn define(&mut self, name: &str) -> MpBuilder<'_> {
        MpBuilder {
            client: self,
            name: name.to_string(),
            fields: Vec::new(),
            bindings: Vec::new(),
        }
    }

    /// Cria explicitamente um canal nomeado no domínio padrão.
    pub fn create_channel(&mut self, name: &str, url: &str) -> Result<()> {
        self.create_channel_in_domain(name, url, DEFAULT_DOMAIN)
    }

    /// Cria explicitamente um canal nomeado em um domínio. Criação é
    /// idempotente para a mesma URL; só é permitida antes do `start` — um
    /// canal criado depois nunca receberia o cabeçalho do protocolo.
    pub fn create_channel_in_domain(&mut self, name: &str, url: &str, domain: &str) -> Result<()> {
        if self.config.noop {
            return Ok(());
        }
        if self.started {
            return Err(Error::Config(format!(
                "canal '{name}' criado depois do start"
            )));
        }
        self.registry.create(name, url, domain).map(|_| ())
    }

    /// Congela as declarações e ativa a coleta: cria os canais da
    /// configuração, resolve os vínculos de cada ponto (caindo no canal
    /// "default" quando não há vínculo explícito), emite o cabeçalho do
    /// protocolo uma vez por canal, registra os schemas e fecha o cabeçalho
    /// com uma linha em branco.
    ///
    /// Idempotente: chamadas subsequentes são no-op. O recebedor `&mut self`
    /// serializa tentativas concorrentes de inicialização.
    pub fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }
        if self.config.noop {
            self.started = true;
            info!("Coleta em modo no-op: medições serão descartadas");
            return Ok(());
        }

        for channel in &self.config.channels {
            self.registry
                .create(&channel.name, &channel.url, DEFAULT_DOMAIN)?;
        }

        // Resolve os vínculos antes de emitir qualquer linha: os cabeçalhos
        // precisam preceder as linhas de schema em cada canal.
        let mut resolved: Vec<Vec<Arc<Channel>>> = Vec::with_capacity(self.points.len());
        for point in &self.points {
            let bindings = if point.bindings.is_empty() {
                vec![ChannelKey::in_default("default")]
            } else {
                point.bindings.clone()
            };
            let mut channels = Vec::with_capacity(bindings.len());
            for key in &bindings {
                channels.push(self.registry.resolve(&key.name, &key.domain)?);
            }
            resolved.push(channels);
        }

        let epoch = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let begin = Instant::now();

        for channel in self.registry.all() {
            let domain = if channel.key().domain == DEFAULT_DOMAIN {
                self.config.domain.as_str()
            } else {
                channel.key().domain.as_str()
            };
            channel.send_header(domain, &self.config.node_id, &self.config.app_name, epoch)?;
        }

        for (point, channels) in self.points.iter_mut().zip(resolved) {
            let wire_name = if self.config.app_name.is_empty() {
                point.name.clone()
            } else {
                format!("{}_{}", self.config.app_name, point.name)
            };
            let state = point.state.get_mut().unwrap_or_else(PoisonError::into_inner);
            for channel in channels {
                let index = channel.register_schema(&wire_name, &point.fields)?;
                state.outputs.push((channel, index));
            }
        }

        for channel in self.registry.all() {
            channel.end_header()?;
        }

        self.start = Some((begin, epoch));
        self.started = true;
        info!(
            "Coleta ativa: {} ponto(s) de medição, {} canal(is)",
            self.points.len(),
            self.registry.len()
        );
        Ok(())
    }

    /// Injeta uma medição no ponto dado.
    ///
    /// Coleta inativa (antes do `start` ou em modo no-op): a medição é ecoada
    /// no log de debug e descartada, sem erro. Coleta ativa: valida aridade e
    /// tipos contra o schema (nada é enfileirado em caso de erro), incrementa
    /// o contador de sequência e enfileira a linha em todos os canais
    /// vinculados.
    pub fn inject(&self, handle: MpHandle, values: &[Value]) -> Result<()> {
        let point = self
            .points
            .get(handle.0)
            .ok_or_else(|| Error::Lookup(format!("ponto de medição #{}", handle.0)))?;

        let Some((begin, _)) = self.start else {
            debug!(ponto = %point.name, ?values, "medição descartada (coleta inativa)");
            return Ok(());
        };

        if values.len() != point.fields.len() {
            return Err(Error::Validation {
                mp: point.name.clone(),
                reason: format!(
                    "{} campo(s) declarado(s), {} valor(es) recebido(s)",
                    point.fields.len(),
                    values.len()
                ),
            });
        }
        for (value, field) in values.iter().zip(&point.fields) {
            if value.field_type() != field.ftype {
                return Err(Error::Validation {
                    mp: point.name.clone(),
                    reason: format!(
                        "campo '{}' espera {}, recebeu {}",
                        field.name,
                        field.ftype,
                        value.field_type()
                    ),
                });
            }
        }

        let elapsed = begin.elapsed().as_secs_f64();

        // Incremento de sequência e enfileiramento sob o mesmo lock: mantém
        // os números de sequência não-decrescentes no fio mesmo com injeção
        // concorrente no mesmo ponto.
        let mut state = point.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.seq_no += 1;
        let seq_no = state.seq_no;
        for (channel, index) in &state.outputs {
            channel.enqueue(protocol::data_line(elapsed, *index, seq_no, values))?;
        }
        Ok(())
    }

    /// Coleta ativa e entregando (start feito, fora do modo no-op).
    pub fn is_active(&self) -> bool {
        self.started && !self.config.noop
    }

    /// Epoch (segundos) capturado no start, se ativo.
    pub fn start_time(&self) -> Option<u64> {
        self.start.map(|(_, epoch)| epoch)
    }

    /// Saúde de um canal, se ele existe. Não cria nem clona canais.
    pub fn channel_health(&self, name: &str, domain: &str) -> Option<Health> {
        self.registry.get(name, domain).map(|c| c.health())
    }

    /// Encerra a coleta: drena e fecha todos os canais. Bloqueia até cada
    /// fila ser drenada; idempotente. Injeções depois do close falham com
    /// `ClosedChannel`.
    pub fn close(&mut self) {
        if !self.started || self.config.noop {
            return;
        }
        self.registry.close_all();
        info!("Coleta encerrada");
    }
}

/// Builder de um ponto de medição; obtido via [`Client::define`].
pub struct MpBuilder<'a> {
    client: &'a mut Client,
    name: String,
    fields: Vec<FieldDef>,
    bindings: Vec<ChannelKey>,
}

impl MpBuilder<'_> {
    /// Acrescenta um campo. A ordem de declaração é a ordem das colunas no
    /// fio.
    pub fn field(mut self, name: &str, ftype: FieldType) -> Self {
        self.fields.push(FieldDef::new(name, ftype));
        self
    }

    /// Vincula o ponto a um canal nomeado no domínio padrão. Vários vínculos
    /// são permitidos (fan-out).
    pub fn channel(self, name: &str) -> Self {
        self.channel_in_domain(name, DEFAULT_DOMAIN)
    }

    /// Vincula o ponto a um canal em um domínio específico.
    pub fn channel_in_domain(mut self, name: &str, domain: &str) -> Self {
        self.bindings.push(ChannelKey::new(name, domain));
        self
    }

    /// Valida e registra o ponto. Falha com erro de declaração depois do
    /// freeze, com nome vazio, sem campos ou com campo duplicado.
    pub fn register(self) -> Result<MpHandle> {
        if self.client.started {
            return Err(Error::Declaration(format!(
                "ponto '{}' declarado depois do start",
                self.name
            )));
        }
        if self.name.is_empty() {
            return Err(Error::Declaration("ponto de medição sem nome".into()));
        }
        if self.fields.is_empty() {
            return Err(Error::Declaration(format!(
                "ponto '{}' sem campos",
                self.name
            )));
        }
        for (i, field) in self.fields.iter().enumerate() {
            if self.fields[..i].iter().any(|f| f.name == field.name) {
                return Err(Error::Declaration(format!(
                    "campo '{}' duplicado no ponto '{}'",
                    field.name, self.name
                )));
            }
        }

        let handle = MpHandle(self.client.points.len());
        self.client.points.push(MeasurePoint {
            name: self.name,
            fields: self.fields,
            bindings: self.bindings,
            state: Mutex::new(MpState::default()),
        });
        Ok(handle)
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChannelConfig;
    use crate::protocol::SchemaDecl;

    fn config_with_file(dir: &tempfile::TempDir, name: &str) -> (ClientConfig, std::path::PathBuf) {
        let path = dir.path().join(name);
        let config = ClientConfig {
            domain: "expA".into(),
            node_id: "n1".into(),
            app_name: "app1".into(),
            channels: vec![ChannelConfig {
                name: "default".into(),
                url: format!("file:{}", path.display()),
            }],
            noop: false,
        };
        (config, path)
    }

    fn sin_client(dir: &tempfile::TempDir) -> (Client, MpHandle, std::path::PathBuf) {
        let (config, path) = config_with_file(dir, "saida.log");
        let mut client = Client::new(config).unwrap();
        let mp = client
            .define("sin")
            .field("label", FieldType::String)
            .field("angle", FieldType::Int32)
            .field("value", FieldType::Double)
            .register()
            .unwrap();
        (client, mp, path)
    }

    fn sample_values(angle: i32) -> [Value; 3] {
        [
            Value::from(format!("label_{angle}")),
            Value::from(angle),
            Value::from(f64::from(angle).to_radians().sin()),
        ]
    }

    #[test]
    fn end_to_end_stream_layout() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, mp, path) = sin_client(&dir);

        client.start().unwrap();
        for angle in [0, 15, 30] {
            client.inject(mp, &sample_values(angle)).unwrap();
        }
        client.close();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();

        // Preâmbulo de seis linhas, schema, linha em branco, três dados
        assert_eq!(lines.len(), 6 + 1 + 1 + 3);
        assert_eq!(lines[0], "protocol: 1");
        assert_eq!(lines[1], "experiment-id: expA");
        assert!(lines[2].starts_with("start_time: "));
        assert_eq!(lines[3], "sender-id: n1");
        assert_eq!(lines[4], "app-name: app1");
        assert_eq!(lines[5], "content: text");
        assert_eq!(
            lines[6],
            "schema: 1 app1_sin label:string angle:int32 value:double"
        );
        assert_eq!(lines[7], "");

        let decl = SchemaDecl::parse(lines[6]).unwrap();
        for (i, line) in lines[8..].iter().enumerate() {
            assert_eq!(line.split('\t').count(), 3 + 3);
            let sample = crate::protocol::decode_data_line(&decl, line).unwrap();
            assert_eq!(sample.seq_no, i as u64 + 1);
        }
    }

    #[test]
    fn sequence_increments_independent_of_fanout() {
        let dir = tempfile::tempdir().unwrap();
        let (config, path_a) = config_with_file(&dir, "a.log");
        let path_b = dir.path().join("b.log");

        let mut client = Client::new(config).unwrap();
        client
            .create_channel("espelho", &format!("file:{}", path_b.display()))
            .unwrap();
        let mp = client
            .define("sin")
            .field("value", FieldType::Double)
            .channel("default")
            .channel("espelho")
            .register()
            .unwrap();

        client.start().unwrap();
        for _ in 0..3 {
            client.inject(mp, &[Value::from(0.5f64)]).unwrap();
        }
        client.close();

        for path in [&path_a, &path_b] {
            let content = std::fs::read_to_string(path).unwrap();
            let seqs: Vec<u64> = content
                .lines()
                .skip_while(|l| !l.is_empty())
                .skip(1)
                .map(|l| l.split('\t').nth(2).unwrap().parse().unwrap())
                .collect();
            assert_eq!(seqs, vec![1, 2, 3]);
        }
    }

    #[test]
    fn schema_indices_follow_registration_order() {
        let dir = tempfile::tempdir().unwrap();
        let (config, path) = config_with_file(&dir, "saida.log");
        let mut client = Client::new(config).unwrap();

        client
            .define("sin")
            .field("value", FieldType::Double)
            .register()
            .unwrap();
        client
            .define("cos")
            .field("value", FieldType::Double)
            .register()
            .unwrap();
        client.start().unwrap();
        client.close();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("schema: 1 app1_sin value:double"));
        assert!(content.contains("schema: 2 app1_cos value:double"));
    }

    #[test]
    fn start_twice_emits_schemas_once() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _mp, path) = sin_client(&dir);

        client.start().unwrap();
        client.start().unwrap();
        client.close();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.matches("schema: ").count(), 1);
        assert_eq!(content.matches("protocol: 1").count(), 1);
    }

    #[test]
    fn wrong_arity_fails_and_enqueues_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, mp, path) = sin_client(&dir);
        client.start().unwrap();

        let result = client.inject(mp, &[Value::from("só um")]);
        assert!(matches!(result, Err(Error::Validation { .. })));
        client.close();

        let content = std::fs::read_to_string(&path).unwrap();
        // Nada depois da linha em branco
        assert!(content.ends_with("\n\n"));
    }

    #[test]
    fn wrong_value_type_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, mp, _path) = sin_client(&dir);
        client.start().unwrap();

        let result = client.inject(
            mp,
            &[Value::from("l"), Value::from(1.5f64), Value::from(0.0f64)],
        );
        assert!(matches!(result, Err(Error::Validation { .. })));
        client.close();
    }

    #[test]
    fn declaration_after_start_fails() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, _mp, _path) = sin_client(&dir);
        client.start().unwrap();

        let result = client
            .define("tarde")
            .field("v", FieldType::Double)
            .register();
        assert!(matches!(result, Err(Error::Declaration(_))));
        client.close();
    }

    #[test]
    fn empty_and_duplicate_fields_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (config, _path) = config_with_file(&dir, "saida.log");
        let mut client = Client::new(config).unwrap();

        assert!(matches!(
            client.define("vazio").register(),
            Err(Error::Declaration(_))
        ));
        assert!(matches!(
            client
                .define("dup")
                .field("x", FieldType::Int32)
                .field("x", FieldType::Double)
                .register(),
            Err(Error::Declaration(_))
        ));
    }

    #[test]
    fn inject_before_start_is_silent() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, mp, path) = sin_client(&dir);

        client.inject(mp, &sample_values(0)).unwrap();
        client.start().unwrap();
        client.close();

        let content = std::fs::read_to_string(&path).unwrap();
        // A medição pré-start não foi entregue
        assert!(content.ends_with("\n\n"));
    }

    #[test]
    fn noop_mode_never_errors_and_opens_nothing() {
        let mut client = Client::new(ClientConfig {
            noop: true,
            ..ClientConfig::default()
        })
        .unwrap();
        let mp = client
            .define("sin")
            .field("value", FieldType::Double)
            .register()
            .unwrap();

        client.start().unwrap();
        assert!(!client.is_active());
        // Aridade errada também não é erro: modo desativado nunca levanta
        client.inject(mp, &[]).unwrap();
        client.inject(mp, &[Value::from(1.0f64)]).unwrap();
        client.close();
    }

    #[test]
    fn unbound_point_falls_back_to_default_channel() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, mp, path) = sin_client(&dir);

        client.start().unwrap();
        client.inject(mp, &sample_values(15)).unwrap();
        client.close();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("schema: 1 app1_sin"));
        assert!(content.lines().last().unwrap().contains("label_15"));
    }

    #[test]
    fn missing_default_channel_is_lookup_error() {
        let mut client = Client::new(ClientConfig {
            domain: "expA".into(),
            node_id: "n1".into(),
            app_name: "app1".into(),
            channels: Vec::new(),
            noop: false,
        })
        .unwrap();
        client
            .define("sin")
            .field("value", FieldType::Double)
            .register()
            .unwrap();

        assert!(matches!(client.start(), Err(Error::Lookup(_))));
    }

    #[test]
    fn domain_binding_clones_default_channel() {
        let dir = tempfile::tempdir().unwrap();
        let (config, _path) = config_with_file(&dir, "saida.log");
        let mut client = Client::new(config).unwrap();

        let mp = client
            .define("sin")
            .field("value", FieldType::Double)
            .channel_in_domain("default", "expB")
            .register()
            .unwrap();
        client.start().unwrap();

        assert_eq!(client.channel_health("default", "expB"), Some(Health::Open));
        client.inject(mp, &[Value::from(1.0f64)]).unwrap();
        client.close();
        assert_eq!(
            client.channel_health("default", "expB"),
            Some(Health::Closed)
        );
    }

    #[test]
    fn inject_after_close_fails_fast() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, mp, _path) = sin_client(&dir);
        client.start().unwrap();
        client.close();

        assert!(matches!(
            client.inject(mp, &sample_values(0)),
            Err(Error::ClosedChannel(_))
        ));
    }

    #[test]
    fn concurrent_injection_keeps_wire_order() {
        let dir = tempfile::tempdir().unwrap();
        let (mut client, mp, path) = sin_client(&dir);
        client.start().unwrap();

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    for angle in 0..25 {
                        client.inject(mp, &sample_values(angle)).unwrap();
                    }
                });
            }
        });
        client.close();

        let content = std::fs::read_to_string(&path).unwrap();
        let seqs: Vec<u64> = content
            .lines()
            .skip_while(|l| !l.is_empty())
            .skip(1)
            .map(|l| l.split('\t').nth(2).unwrap().parse().unwrap())
            .collect();
        assert_eq!(seqs.len(), 100);
        assert!(seqs.windows(2).all(|w| w[0] < w[1]), "sequência fora de ordem");
        assert_eq!(*seqs.last().unwrap(), 100);
    }

    #[test]
    fn invalid_config_is_rejected_at_creation() {
        let result = Client::new(ClientConfig::default());
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
