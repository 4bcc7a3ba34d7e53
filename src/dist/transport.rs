//! TCP transport for the coordinator protocol.
//!
//! Every connection is served by its own thread; requests on one connection
//! are answered in order.

use std::{
    io::{BufRead, BufReader, Write},
    net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs},
    sync::Arc,
    thread::{self, JoinHandle},
};

use tracing::{debug, info, trace, warn};

use crate::{
    dist::{agent::CoordinatorApi, proto::*, Coordinator, Partition},
    sim::SimHandle,
    Error, Result,
};

pub trait Service: Send + Sync + 'static {
    fn handle(&self, request: Request) -> Response;
}

/// What a node exposes on the network: the coordinator operations when it
/// runs one, and key presses for its run loop.
#[derive(Debug, Default)]
pub struct NodeService {
    coordinator: Option<Arc<Coordinator>>,
    keys: Option<SimHandle>,
}

impl NodeService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_coordinator(mut self, coordinator: Arc<Coordinator>) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    pub fn with_keys(mut self, keys: SimHandle) -> Self {
        self.keys = Some(keys);
        self
    }
}

impl NodeService {
    fn key_press(&self, key: char) -> Response {
        match &self.keys {
            Some(keys) if keys.key_press(key) => Response::KeyAccepted,
            Some(_) => Response::error("finished", "the run loop has stopped"),
            None => Response::error("no_run_loop", "this node takes no key presses"),
        }
    }
}

impl Service for NodeService {
    fn handle(&self, request: Request) -> Response {
        let coordinator = match (&request, &self.coordinator) {
            (Request::KeyPress { key }, _) => return self.key_press(*key),
            (_, None) => {
                return Response::error("not_coordinator", "this node runs no coordinator")
            }
            // inherent methods, not the agent-side `CoordinatorApi` of `Arc`.
            (_, Some(coordinator)) => coordinator.as_ref(),
        };
        match request {
            Request::FetchMyConfig => Response::Config {
                assignment: coordinator.fetch_my_config(),
            },
            Request::CheckNextTurn { partition } => {
                Response::Status(coordinator.check_next_turn(partition))
            }
            Request::FetchNextTurn { partition } => match coordinator.fetch_next_turn(partition) {
                Ok(next) => Response::NextTurn(next),
                Err(rejection) => rejection.into(),
            },
            Request::ReportMyState(report) => match coordinator.report_my_state(report) {
                Ok(()) => Response::Reported,
                Err(rejection) => rejection.into(),
            },
            Request::KeyPress { key } => self.key_press(key),
        }
    }
}

pub struct Server {
    listener: TcpListener,
    service: Arc<dyn Service>,
}

impl Server {
    pub fn bind(addr: impl ToSocketAddrs, service: impl Service) -> Result<Self> {
        let listener = TcpListener::bind(addr)?;
        Ok(Self {
            listener,
            service: Arc::new(service),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// accepts connections on a background thread for the rest of the process.
    pub fn spawn(self) -> JoinHandle<()> {
        thread::spawn(move || self.accept_loop())
    }

    fn accept_loop(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!(%addr, "listening");
        }
        for stream in self.listener.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(error) => {
                    warn!(%error, "failed to accept a connection");
                    continue;
                }
            };
            let service = self.service.clone();
            thread::spawn(move || {
                let peer = stream.peer_addr().ok();
                debug!(?peer, "connection opened");
                if let Err(error) = serve_connection(stream, service.as_ref()) {
                    warn!(?peer, %error, "connection dropped");
                } else {
                    debug!(?peer, "connection closed");
                }
            });
        }
    }
}

fn serve_connection(stream: TcpStream, service: &dyn Service) -> Result<()> {
    let mut writer = stream.try_clone()?;
    let reader = BufReader::new(stream);
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let response = match decode_request(&line) {
            Ok(request) => {
                trace!(op = request.name(), "request");
                service.handle(request)
            }
            Err(error) => Response::error("parse_error", error),
        };
        writer.write_all(&encode(&response)?)?;
    }
    Ok(())
}

/// One connection to a node, requests are answered in order.
pub struct Client {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
}

impl Client {
    pub fn connect(addr: impl ToSocketAddrs) -> Result<Self> {
        let writer = TcpStream::connect(addr)?;
        writer.set_nodelay(true)?;
        let reader = BufReader::new(writer.try_clone()?);
        Ok(Self { reader, writer })
    }

    pub fn call(&mut self, request: &Request) -> Result<Response> {
        self.writer.write_all(&encode(request)?)?;
        let mut line = String::new();
        if self.reader.read_line(&mut line)? == 0 {
            return Err(Error::Disconnected);
        }
        decode_response(line.trim_end())?.into_result()
    }

    pub fn key_press(&mut self, key: char) -> Result<()> {
        match self.call(&Request::KeyPress { key })? {
            Response::KeyAccepted => Ok(()),
            _ => Err(Error::UnexpectedResponse("key_press")),
        }
    }
}

impl CoordinatorApi for Client {
    fn fetch_my_config(&mut self) -> Result<Option<Assignment>> {
        match self.call(&Request::FetchMyConfig)? {
            Response::Config { assignment } => Ok(assignment),
            _ => Err(Error::UnexpectedResponse("fetch_my_config")),
        }
    }

    fn check_next_turn(&mut self, partition: Partition) -> Result<TurnStatus> {
        match self.call(&Request::CheckNextTurn { partition })? {
            Response::Status(status) => Ok(status),
            _ => Err(Error::UnexpectedResponse("check_next_turn")),
        }
    }

    fn fetch_next_turn(&mut self, partition: Partition) -> Result<NextTurn> {
        match self.call(&Request::FetchNextTurn { partition })? {
            Response::NextTurn(next) => Ok(next),
            _ => Err(Error::UnexpectedResponse("fetch_next_turn")),
        }
    }

    fn report_my_state(&mut self, report: Report) -> Result<()> {
        match self.call(&Request::ReportMyState(report))? {
            Response::Reported => Ok(()),
            _ => Err(Error::UnexpectedResponse("report_my_state")),
        }
    }
}
