//! Canal de entrega: um sink (arquivo, stdout ou TCP), uma fila ilimitada de
//! linhas prontas e uma thread dedicada de escrita.
//!
//! A thread de escrita drena a fila em ordem FIFO e coalesce tudo que já
//! estiver disponível em uma única escrita. O fechamento usa um sentinela na
//! própria fila: as linhas enfileiradas antes do `close` chegam ao sink antes
//! de ele ser fechado.
//!
//! Falha de E/S durante a entrega **não** é propagada ao chamador: a thread
//! registra um aviso, marca o canal como [`Health::Degraded`] e termina; o
//! canal fica inerte e as linhas seguintes são descartadas.

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::io::{self, Write};
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::protocol;
use crate::types::{ChannelKey, FieldDef};

// ──────────────────────────────────────────────
// Saúde
// ──────────────────────────────────────────────

/// Estado de saúde de um canal, observável pelo chamador.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Health {
    /// Thread de escrita ativa, entregando normalmente.
    Open,
    /// A thread de escrita morreu por falha de E/S; linhas são descartadas.
    Degraded,
    /// Canal fechado; a fila foi drenada e o sink, fechado.
    Closed,
}

impl Health {
    const fn as_u8(self) -> u8 {
        match self {
            Health::Open => 0,
            Health::Degraded => 1,
            Health::Closed => 2,
        }
    }

    fn from_u8(v: u8) -> Self {
        match v {
            0 => Health::Open,
            1 => Health::Degraded,
            _ => Health::Closed,
        }
    }
}

// ──────────────────────────────────────────────
// Sink
// ──────────────────────────────────────────────

/// Destino de um canal, derivado da URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkAddr {
    /// `file:<caminho>` — arquivo local, truncado na abertura.
    File(PathBuf),
    /// `file:-` — saída padrão do processo.
    Stdout,
    /// `tcp:<host>[:<porta>]` — porta padrão 3003.
    Tcp { host: String, port: u16 },
}

impl SinkAddr {
    /// Interpreta uma URL de sink. Qualquer esquema fora de `file:`/`tcp:` é
    /// erro de configuração.
    pub fn parse(url: &str) -> Result<Self> {
        if let Some(path) = url.strip_prefix("file:") {
            if path.is_empty() {
                return Err(Error::Config(format!("URL '{url}' sem caminho de arquivo")));
            }
            if path == "-" {
                return Ok(SinkAddr::Stdout);
            }
            return Ok(SinkAddr::File(PathBuf::from(path)));
        }
        if let Some(rest) = url.strip_prefix("tcp:") {
            let (host, port) = match rest.rsplit_once(':') {
                Some((host, port)) => (
                    host,
                    port.parse::<u16>()
                        .map_err(|_| Error::Config(format!("porta inválida na URL '{url}'")))?,
                ),
                None => (rest, protocol::DEFAULT_SERVER_PORT),
            };
            if host.is_empty() {
                return Err(Error::Config(format!("URL '{url}' sem host")));
            }
            return Ok(SinkAddr::Tcp {
                host: host.to_string(),
                port,
            });
        }
        Err(Error::Config(format!(
            "transporte desconhecido na URL '{url}'"
        )))
    }

    /// Abre o sink. Falha de abertura/conexão é síncrona e fatal para a
    /// criação do canal.
    fn open(&self) -> io::Result<Box<dyn Write + Send>> {
        match self {
            SinkAddr::File(path) => Ok(Box::new(std::fs::File::create(path)?)),
            SinkAddr::Stdout => Ok(Box::new(io::stdout())),
            SinkAddr::Tcp { host, port } => {
                Ok(Box::new(TcpStream::connect((host.as_str(), *port))?))
            }
        }
    }
}

// ──────────────────────────────────────────────
// Canal
// ──────────────────────────────────────────────

/// Mensagem da fila de saída. `Eof` é o sentinela de fechamento.
enum Outbound {
    Line(String),
    Eof,
}

/// Um canal de entrega vivo. Criado e possuído pelo
/// [`crate::registry::ChannelRegistry`]; a thread de escrita começa na
/// criação e termina no `close` ou na primeira falha de E/S.
pub struct Channel {
    key: ChannelKey,
    url: String,
    tx: Sender<Outbound>,
    worker: Mutex<Option<JoinHandle<()>>>,
    /// Próximo índice de schema deste canal; o primeiro atribuído é 1.
    next_index: AtomicU32,
    header_sent: AtomicBool,
    closed: AtomicBool,
    health: Arc<AtomicU8>,
}

impl Channel {
    /// Abre o sink, inicia a thread de escrita e devolve o canal pronto.
    pub(crate) fn open(key: ChannelKey, url: &str) -> Result<Self> {
        let addr = SinkAddr::parse(url)?;
        let sink = addr.open()?;

        let (tx, rx) = unbounded();
        let health = Arc::new(AtomicU8::new(Health::Open.as_u8()));
        let worker_health = Arc::clone(&health);
        let worker_url = url.to_string();
        let worker = std::thread::Builder::new()
            .name(format!("canal-{key}"))
            .spawn(move || writer_loop(rx, sink, worker_health, worker_url))?;

        debug!("Canal '{key}' aberto em {url}");
        Ok(Self {
            key,
            url: url.to_string(),
            tx,
            worker: Mutex::new(Some(worker)),
            next_index: AtomicU32::new(0),
            header_sent: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            health,
        })
    }

    pub fn key(&self) -> &ChannelKey {
        &self.key
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn health(&self) -> Health {
        Health::from_u8(self.health.load(Ordering::Acquire))
    }

    /// Registra o schema de um ponto de medição neste canal e devolve o
    /// índice atribuído (1, 2, … na ordem de registro).
    pub(crate) fn register_schema(&self, mp_name: &str, fields: &[FieldDef]) -> Result<u32> {
        let index = self.next_index.fetch_add(1, Ordering::Relaxed) + 1;
        self.enqueue(protocol::schema_line(index, mp_name, fields))?;
        Ok(index)
    }

    /// Enfileira o preâmbulo do protocolo. No máximo uma vez por canal.
    pub(crate) fn send_header(
        &self,
        domain: &str,
        node_id: &str,
        app_name: &str,
        start_epoch: u64,
    ) -> Result<()> {
        if self.header_sent.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        for line in protocol::header_lines(domain, node_id, app_name, start_epoch) {
            self.enqueue(line)?;
        }
        Ok(())
    }

    /// Linha em branco que separa o cabeçalho das linhas de dados; enviada
    /// depois de todos os registros de schema.
    pub(crate) fn end_header(&self) -> Result<()> {
        self.enqueue(String::new())
    }

    /// Enfileira uma linha pronta. Nunca bloqueia e nunca descarta enquanto o
    /// canal está saudável; depois de `close` falha com `ClosedChannel`; com
    /// a thread de escrita morta (E/S degradada) descarta em silêncio.
    pub(crate) fn enqueue(&self, line: String) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::ClosedChannel(self.url.clone()));
        }
        if self.tx.send(Outbound::Line(line)).is_err() {
            debug!("Canal '{}' degradado, linha descartada", self.key);
        }
        Ok(())
    }

    /// Fecha o canal: envia o sentinela, espera a thread drenar a fila e
    /// fechar o sink. Idempotente; bloqueia até a drenagem terminar.
    pub(crate) fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let _ = self.tx.send(Outbound::Eof);
        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                warn!("Thread de escrita do canal '{}' terminou em pânico", self.key);
            }
        }
        debug!("Canal '{}' fechado", self.key);
    }
}

/// Laço da thread de escrita: Running → (drenagem no sentinela | degradado em
/// falha de E/S) → Closed.
fn writer_loop(
    rx: Receiver<Outbound>,
    mut sink: Box<dyn Write + Send>,
    health: Arc<AtomicU8>,
    url: String,
) {
    loop {
        let first = match rx.recv() {
            Ok(Outbound::Line(line)) => line,
            Ok(Outbound::Eof) | Err(_) => break,
        };

        // Coalescência: junta tudo que já está na fila em uma única escrita.
        let mut block = first;
        let mut eof = false;
        loop {
            match rx.try_recv() {
                Ok(Outbound::Line(line)) => {
                    block.push('\n');
                    block.push_str(&line);
                }
                Ok(Outbound::Eof) => {
                    eof = true;
                    break;
                }
                Err(_) => break,
            }
        }
        block.push('\n');

        if let Err(e) = sink.write_all(block.as_bytes()).and_then(|_| sink.flush()) {
            warn!("Falha de E/S no canal '{url}': {e}; entrega interrompida");
            health.store(Health::Degraded.as_u8(), Ordering::Release);
            return;
        }

        if eof {
            break;
        }
    }

    if let Err(e) = sink.flush() {
        debug!("Flush final do canal '{url}' falhou: {e}");
    }
    health.store(Health::Closed.as_u8(), Ordering::Release);
    // O sink fecha no drop.
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
