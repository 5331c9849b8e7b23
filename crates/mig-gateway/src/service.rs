//! The MIG service: request router and event hub.
//!
//! The service owns the gateways, the backend interfaces and the API handler
//! registry. Gateways hand every client request to a [`Dispatcher`], which
//! runs the pipeline:
//!
//! 1. pre-process hooks of the originating gateway
//! 2. the management domain `MIGService.Interfaces`
//! 3. the enabled interface whose domain is the longest prefix of the command domain
//! 4. the handler registry (exact `domain/address/command`, then longest prefix)
//! 5. post-process hooks of the originating gateway
//!
//! Steps 2 to 4 are skipped once a request is handled and for static content
//! requests. Events raised by interfaces or through [`MigService::raise_event`]
//! are queued and delivered in order by a single pump task to every gateway.

use crate::dynamic_api::HandlerRegistry;
use crate::error::GatewayError;
use crate::gateway::Gateway;
use crate::request::ClientRequest;
use crate::Result;
use mig_core::option::parse_bool;
use mig_core::{Event, MigOption, OptionSet, ResponseData, ResponseStatus, ResponseText};
use mig_interfaces::{InterfaceEvent, InterfaceEventSink, MigInterface};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Reserved domain for interface management commands.
pub const MANAGEMENT_DOMAIN: &str = "MIGService.Interfaces";

const OBSERVER_CAPACITY: usize = 256;

/// Hook run on every request of one gateway, before or after built-in handling.
pub type RequestHook = Arc<dyn Fn(&mut ClientRequest) + Send + Sync>;

/// Notification for application observers.
#[derive(Debug, Clone)]
pub enum ServiceEvent {
    /// A property changed; already delivered to every gateway.
    PropertyChanged(Event),

    /// The module list of an interface changed.
    ModulesChanged { domain: String },
}

/// A registered gateway with its options and hooks.
struct GatewayEntry {
    gateway: Arc<dyn Gateway>,
    options: OptionSet,
    pre_process: Vec<RequestHook>,
    post_process: Vec<RequestHook>,
}

/// A registered interface with its enable flag and options.
struct InterfaceEntry {
    interface: Arc<dyn MigInterface>,
    enabled: bool,
    options: OptionSet,
}

struct ServiceInner {
    gateways: RwLock<Vec<GatewayEntry>>,
    interfaces: RwLock<Vec<InterfaceEntry>>,
    handlers: HandlerRegistry,
    sink: InterfaceEventSink,
    queue: Mutex<mpsc::UnboundedReceiver<InterfaceEvent>>,
    observers: broadcast::Sender<ServiceEvent>,
    pump: parking_lot::Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
    running: AtomicBool,
}

/// The request router. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct MigService {
    inner: Arc<ServiceInner>,
}

/// Handle gateways use to submit requests to the router.
///
/// Holds a weak reference so that gateways do not keep the service alive.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Weak<ServiceInner>,
}

impl Dispatcher {
    /// Run the dispatch pipeline and return the processed request.
    pub async fn dispatch(&self, request: ClientRequest) -> ClientRequest {
        match self.inner.upgrade() {
            Some(inner) => inner.dispatch(request).await,
            None => {
                debug!("service dropped, request left unhandled");
                request
            }
        }
    }
}

impl Default for MigService {
    fn default() -> Self {
        Self::new()
    }
}

impl MigService {
    /// Create a service with no gateways and no interfaces.
    pub fn new() -> Self {
        let (sink, queue) = InterfaceEventSink::channel();
        let (observers, _) = broadcast::channel(OBSERVER_CAPACITY);
        Self {
            inner: Arc::new(ServiceInner {
                gateways: RwLock::new(Vec::new()),
                interfaces: RwLock::new(Vec::new()),
                handlers: HandlerRegistry::new(),
                sink,
                queue: Mutex::new(queue),
                observers,
                pump: parking_lot::Mutex::new(None),
                running: AtomicBool::new(false),
            }),
        }
    }

    /// Handle for submitting requests.
    pub fn dispatcher(&self) -> Dispatcher {
        Dispatcher {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// The dynamic API handler registry.
    pub fn handlers(&self) -> &HandlerRegistry {
        &self.inner.handlers
    }

    /// Subscribe to property and module change notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ServiceEvent> {
        self.inner.observers.subscribe()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Queue an event for delivery to every gateway.
    pub fn raise_event(&self, event: Event) {
        self.inner.sink.property_changed(event);
    }

    /// Run a request through the pipeline.
    pub async fn dispatch(&self, request: ClientRequest) -> ClientRequest {
        self.inner.dispatch(request).await
    }

    // ---- gateways ----

    /// Register a gateway and apply its initial options.
    pub async fn add_gateway(&self, gateway: Arc<dyn Gateway>, options: OptionSet) -> Result<()> {
        let name = gateway.name().to_string();
        if self.gateway(&name).await.is_some() {
            return Err(GatewayError::AlreadyExists(name));
        }

        for option in options.iter() {
            gateway.on_set_option(option).await?;
        }

        let mut gateways = self.inner.gateways.write().await;
        gateways.push(GatewayEntry {
            gateway,
            options,
            pre_process: Vec::new(),
            post_process: Vec::new(),
        });
        info!("Registered gateway: {}", name);
        Ok(())
    }

    pub async fn gateway(&self, name: &str) -> Option<Arc<dyn Gateway>> {
        let gateways = self.inner.gateways.read().await;
        gateways
            .iter()
            .find(|e| e.gateway.name() == name)
            .map(|e| e.gateway.clone())
    }

    pub async fn gateways(&self) -> Vec<Arc<dyn Gateway>> {
        self.inner.gateway_list().await
    }

    /// Add a hook that runs before built-in handling of requests from `gateway`.
    pub async fn add_pre_process_hook<F>(&self, gateway: &str, hook: F) -> Result<()>
    where
        F: Fn(&mut ClientRequest) + Send + Sync + 'static,
    {
        let mut gateways = self.inner.gateways.write().await;
        let entry = find_gateway_mut(&mut gateways, gateway)?;
        entry.pre_process.push(Arc::new(hook));
        Ok(())
    }

    /// Add a hook that runs after built-in handling of requests from `gateway`.
    pub async fn add_post_process_hook<F>(&self, gateway: &str, hook: F) -> Result<()>
    where
        F: Fn(&mut ClientRequest) + Send + Sync + 'static,
    {
        let mut gateways = self.inner.gateways.write().await;
        let entry = find_gateway_mut(&mut gateways, gateway)?;
        entry.post_process.push(Arc::new(hook));
        Ok(())
    }

    pub async fn gateway_option(&self, gateway: &str, name: &str) -> Option<MigOption> {
        let gateways = self.inner.gateways.read().await;
        gateways
            .iter()
            .find(|e| e.gateway.name() == gateway)
            .and_then(|e| e.options.get(name).cloned())
    }

    /// Set a gateway option and notify the gateway.
    pub async fn set_gateway_option(
        &self,
        gateway: &str,
        name: &str,
        value: &str,
    ) -> Result<MigOption> {
        let (target, option) = {
            let mut gateways = self.inner.gateways.write().await;
            let entry = find_gateway_mut(&mut gateways, gateway)?;
            (entry.gateway.clone(), entry.options.set(name, value))
        };
        target.on_set_option(&option).await?;
        Ok(option)
    }

    // ---- interfaces ----

    /// Register an interface, hand it the event sink and apply its options.
    ///
    /// When the service is running and `enabled` is set the interface is
    /// connected right away; a failed connect leaves it registered.
    pub async fn add_interface(
        &self,
        interface: Arc<dyn MigInterface>,
        enabled: bool,
        options: OptionSet,
    ) -> Result<()> {
        let domain = interface.domain().to_string();
        if self.interface(&domain).await.is_some() {
            return Err(GatewayError::AlreadyExists(domain));
        }

        interface.set_event_sink(self.inner.sink.clone());
        for option in options.iter() {
            interface.on_set_option(option).await?;
        }

        {
            let mut interfaces = self.inner.interfaces.write().await;
            interfaces.push(InterfaceEntry {
                interface: interface.clone(),
                enabled,
                options,
            });
        }
        info!("Registered interface: {}", domain);

        if enabled && self.is_running() {
            connect_interface(&interface).await;
        }
        Ok(())
    }

    /// Unregister an interface and disconnect it.
    pub async fn remove_interface(&self, domain: &str) -> Result<()> {
        let removed = {
            let mut interfaces = self.inner.interfaces.write().await;
            let index = interfaces
                .iter()
                .position(|e| e.interface.domain() == domain)
                .ok_or_else(|| GatewayError::NotFound(domain.to_string()))?;
            interfaces.remove(index)
        };

        if let Err(e) = removed.interface.disconnect().await {
            warn!("Error disconnecting interface {}: {}", domain, e);
        }
        info!("Unregistered interface: {}", domain);
        Ok(())
    }

    pub async fn interface(&self, domain: &str) -> Option<Arc<dyn MigInterface>> {
        let interfaces = self.inner.interfaces.read().await;
        interfaces
            .iter()
            .find(|e| e.interface.domain() == domain)
            .map(|e| e.interface.clone())
    }

    pub async fn interfaces(&self) -> Vec<Arc<dyn MigInterface>> {
        let interfaces = self.inner.interfaces.read().await;
        interfaces.iter().map(|e| e.interface.clone()).collect()
    }

    pub async fn is_interface_enabled(&self, domain: &str) -> Option<bool> {
        self.inner.interface_enabled(domain).await
    }

    /// Enable or disable an interface, connecting or disconnecting it when running.
    pub async fn set_interface_enabled(&self, domain: &str, enabled: bool) -> Result<()> {
        self.inner.set_interface_enabled(domain, enabled).await
    }

    pub async fn interface_option(&self, domain: &str, name: &str) -> Option<MigOption> {
        self.inner.interface_option(domain, name).await
    }

    /// Set an interface option and notify the interface.
    pub async fn set_interface_option(
        &self,
        domain: &str,
        name: &str,
        value: &str,
    ) -> Result<MigOption> {
        self.inner.set_interface_option(domain, name, value).await
    }

    // ---- lifecycle ----

    /// Start every gateway, connect enabled interfaces, disconnect the rest
    /// and start the event pump.
    ///
    /// Gateways that fail to start are reported together in
    /// [`GatewayError::Start`] after everything else has been started.
    pub async fn start(&self) -> Result<()> {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        info!("Starting MIG service");

        let dispatcher = self.dispatcher();
        let mut failed = Vec::new();
        for gateway in self.inner.gateway_list().await {
            match gateway.start(dispatcher.clone()).await {
                Ok(()) => info!(
                    gateway = gateway.name(),
                    addr = ?gateway.local_addr(),
                    "gateway started"
                ),
                Err(e) => {
                    error!(gateway = gateway.name(), error = %e, "failed to start gateway");
                    failed.push(format!("{}: {}", gateway.name(), e));
                }
            }
        }

        for (interface, enabled) in self.inner.interface_list().await {
            if enabled {
                connect_interface(&interface).await;
            } else if let Err(e) = interface.disconnect().await {
                warn!("Error disconnecting interface {}: {}", interface.domain(), e);
            }
        }

        self.start_pump();

        if failed.is_empty() {
            Ok(())
        } else {
            Err(GatewayError::Start(failed.join("; ")))
        }
    }

    /// Disable and disconnect every interface, stop every gateway and stop the event pump.
    pub async fn stop(&self) -> Result<()> {
        self.inner.running.store(false, Ordering::SeqCst);
        info!("Stopping MIG service");

        let interfaces: Vec<Arc<dyn MigInterface>> = {
            let mut interfaces = self.inner.interfaces.write().await;
            interfaces
                .iter_mut()
                .map(|entry| {
                    entry.enabled = false;
                    entry.interface.clone()
                })
                .collect()
        };
        for interface in interfaces {
            if let Err(e) = interface.disconnect().await {
                warn!("Error disconnecting interface {}: {}", interface.domain(), e);
            }
        }

        for gateway in self.inner.gateway_list().await {
            if let Err(e) = gateway.stop().await {
                warn!(gateway = gateway.name(), error = %e, "error stopping gateway");
            }
        }

        let pump = self.inner.pump.lock().take();
        if let Some((token, handle)) = pump {
            token.cancel();
            let _ = handle.await;
        }
        Ok(())
    }

    fn start_pump(&self) {
        let mut pump = self.inner.pump.lock();
        if pump.is_some() {
            return;
        }
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_pump(self.inner.clone(), token.clone()));
        *pump = Some((token, handle));
    }
}

fn find_gateway_mut<'a>(
    gateways: &'a mut [GatewayEntry],
    name: &str,
) -> Result<&'a mut GatewayEntry> {
    gateways
        .iter_mut()
        .find(|e| e.gateway.name() == name)
        .ok_or_else(|| GatewayError::NotFound(name.to_string()))
}

async fn connect_interface(interface: &Arc<dyn MigInterface>) {
    match interface.connect().await {
        Ok(()) => info!(domain = interface.domain(), "interface connected"),
        Err(e) => warn!(domain = interface.domain(), error = %e, "interface failed to connect"),
    }
}

async fn run_pump(inner: Arc<ServiceInner>, token: CancellationToken) {
    let mut queue = inner.queue.lock().await;
    loop {
        let event = tokio::select! {
            _ = token.cancelled() => break,
            event = queue.recv() => match event {
                Some(event) => event,
                None => break,
            },
        };
        inner.deliver(event).await;
    }
    debug!("event pump stopped");
}

impl ServiceInner {
    async fn gateway_list(&self) -> Vec<Arc<dyn Gateway>> {
        let gateways = self.gateways.read().await;
        gateways.iter().map(|e| e.gateway.clone()).collect()
    }

    async fn interface_list(&self) -> Vec<(Arc<dyn MigInterface>, bool)> {
        let interfaces = self.interfaces.read().await;
        interfaces
            .iter()
            .map(|e| (e.interface.clone(), e.enabled))
            .collect()
    }

    async fn deliver(&self, event: InterfaceEvent) {
        match event {
            InterfaceEvent::PropertyChanged(event) => {
                debug!(
                    domain = event.domain(),
                    source = event.source(),
                    property = event.property(),
                    "delivering event"
                );
                for gateway in self.gateway_list().await {
                    gateway.on_interface_property_changed(&event).await;
                }
                let _ = self.observers.send(ServiceEvent::PropertyChanged(event));
            }
            InterfaceEvent::ModulesChanged { domain } => {
                debug!(domain = %domain, "modules changed");
                let _ = self.observers.send(ServiceEvent::ModulesChanged { domain });
            }
        }
    }

    async fn dispatch(&self, mut request: ClientRequest) -> ClientRequest {
        let (pre, post) = {
            let gateways = self.gateways.read().await;
            gateways
                .iter()
                .find(|e| e.gateway.name() == request.gateway())
                .map(|e| (e.pre_process.clone(), e.post_process.clone()))
                .unwrap_or_default()
        };

        for hook in &pre {
            hook(&mut request);
        }

        if !request.is_handled() && !request.command().is_static_request() {
            self.route(&mut request).await;
        }

        if !request.is_handled() {
            for hook in &post {
                hook(&mut request);
            }
        }

        request
    }

    async fn route(&self, request: &mut ClientRequest) {
        let command = request.command().clone();
        if !command.is_valid() {
            return;
        }

        if command.domain() == MANAGEMENT_DOMAIN {
            let response = self.manage(&command).await;
            request.set_response(response);
            return;
        }

        if let Some((interface, enabled)) = self.interface_for(command.domain()).await {
            if enabled {
                match interface.interface_control(&command).await {
                    Ok(Some(response)) => request.set_response(response),
                    Ok(None) => {}
                    Err(e) => {
                        warn!(command = %command, error = %e, "interface control failed");
                        request.set_response(ResponseStatus::error(e.to_string()));
                    }
                }
            } else {
                debug!(domain = interface.domain(), "interface disabled, skipping");
            }
        }

        if request.is_handled() {
            return;
        }

        let handler = match self.handlers.find_exact(&command.routing_key()).await {
            Some(handler) => Some(handler),
            None => {
                self.handlers
                    .find_matching(command.original_request().trim_matches('/'))
                    .await
            }
        };

        if let Some(handler) = handler {
            match handler.call(request).await {
                Ok(Some(response)) => request.set_response(response),
                Ok(None) => {}
                Err(e) => {
                    warn!(command = %command, error = %e, "API handler failed");
                    request.set_response(ResponseStatus::error(e.to_string()));
                }
            }
        }
    }

    /// Enabled flag and instance of the interface whose domain is the longest
    /// prefix of `domain`.
    async fn interface_for(&self, domain: &str) -> Option<(Arc<dyn MigInterface>, bool)> {
        let interfaces = self.interfaces.read().await;
        interfaces
            .iter()
            .filter(|e| {
                let candidate = e.interface.domain();
                !candidate.is_empty() && domain.starts_with(candidate)
            })
            .max_by_key(|e| e.interface.domain().len())
            .map(|e| (e.interface.clone(), e.enabled))
    }

    async fn manage(&self, command: &mig_core::Command) -> ResponseData {
        let domain = command.address();
        match command.command() {
            "IsEnabled.Get" => match self.interface_enabled(domain).await {
                Some(enabled) => ResponseText::new(if enabled { "1" } else { "0" }).into(),
                None => unknown_interface(domain),
            },
            "IsEnabled.Set" => {
                let enabled = parse_bool(&command.option(0));
                match self.set_interface_enabled(domain, enabled).await {
                    Ok(()) => ResponseStatus::ok().into(),
                    Err(e) => ResponseStatus::error(e.to_string()).into(),
                }
            }
            "Options.Get" => {
                if self.interface_enabled(domain).await.is_none() {
                    return unknown_interface(domain);
                }
                let value = self
                    .interface_option(domain, &command.option(0))
                    .await
                    .map(|o| o.value)
                    .unwrap_or_default();
                ResponseText::new(value).into()
            }
            "Options.Set" => {
                let name = command.option(0);
                let value = command.option(1);
                match self.set_interface_option(domain, &name, &value).await {
                    Ok(_) => ResponseStatus::ok().into(),
                    Err(e) => ResponseStatus::error(e.to_string()).into(),
                }
            }
            other => ResponseStatus::error(format!("Unknown command: {}", other)).into(),
        }
    }

    async fn interface_enabled(&self, domain: &str) -> Option<bool> {
        let interfaces = self.interfaces.read().await;
        interfaces
            .iter()
            .find(|e| e.interface.domain() == domain)
            .map(|e| e.enabled)
    }

    async fn set_interface_enabled(&self, domain: &str, enabled: bool) -> Result<()> {
        let interface = {
            let mut interfaces = self.interfaces.write().await;
            let entry = interfaces
                .iter_mut()
                .find(|e| e.interface.domain() == domain)
                .ok_or_else(|| GatewayError::NotFound(domain.to_string()))?;
            entry.enabled = enabled;
            entry.interface.clone()
        };
        info!(domain, enabled, "interface enable flag changed");

        if self.running.load(Ordering::SeqCst) {
            if enabled {
                interface.connect().await?;
            } else {
                interface.disconnect().await?;
            }
        }
        Ok(())
    }

    async fn interface_option(&self, domain: &str, name: &str) -> Option<MigOption> {
        let interfaces = self.interfaces.read().await;
        interfaces
            .iter()
            .find(|e| e.interface.domain() == domain)
            .and_then(|e| e.options.get(name).cloned())
    }

    async fn set_interface_option(&self, domain: &str, name: &str, value: &str) -> Result<MigOption> {
        let (interface, option) = {
            let mut interfaces = self.interfaces.write().await;
            let entry = interfaces
                .iter_mut()
                .find(|e| e.interface.domain() == domain)
                .ok_or_else(|| GatewayError::NotFound(domain.to_string()))?;
            (entry.interface.clone(), entry.options.set(name, value))
        };
        interface.on_set_option(&option).await?;
        Ok(option)
    }
}

fn unknown_interface(domain: &str) -> ResponseData {
    ResponseStatus::error(format!("Unknown interface: {}", domain)).into()
}
