//! In-memory dimmer bank.
//!
//! `VirtualInterface` behaves like a serial device driver without hardware:
//! every level change is written to a simulated link and only applied once the
//! link acknowledges it, so the full reply-correlation path runs end to end.
//! It is useful for trying out clients and for tests.
//!
//! Options:
//! - `Modules`: comma separated module addresses (default `1,2,3`)
//! - `Latency`: simulated link round trip in milliseconds (default `0`)
//! - `ReportInterval`: seconds between unsolicited level reports, `0` disables
//! - `Offline`: when true the device is reported missing and `connect` fails
//!
//! Commands: `Control.On`, `Control.Off`, `Control.Toggle`,
//! `Control.Level/<0-100>`, `Status.Level`.

use crate::error::InterfaceError;
use crate::reply::PendingReplies;
use crate::sink::{EventSinkSlot, InterfaceEventSink};
use crate::timer::TimerTask;
use crate::traits::{InterfaceFactory, MigInterface};
use crate::Result;
use async_trait::async_trait;
use mig_core::option::parse_bool;
use mig_core::{
    Command, Event, InterfaceModule, MigOption, ModuleType, OptionSet, ResponseData,
    ResponseStatus, ResponseText,
};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Factory type name.
pub const VIRTUAL_INTERFACE_TYPE: &str = "virtual";

const DEFAULT_MODULES: &str = "1,2,3";
const MODULE_DESCRIPTION: &str = "Virtual Dimmer";
const LEVEL_PROPERTY: &str = "Status.Level";
const REPLY_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug)]
struct Frame {
    id: String,
    level: f64,
}

#[derive(Debug)]
struct Link {
    tx: mpsc::Sender<Frame>,
    device: JoinHandle<()>,
    _reporter: Option<TimerTask>,
}

/// A bank of dimmers kept in memory.
#[derive(Debug)]
pub struct VirtualInterface {
    domain: String,
    options: RwLock<OptionSet>,
    levels: Arc<Mutex<BTreeMap<String, f64>>>,
    sink: Arc<EventSinkSlot>,
    replies: PendingReplies<f64>,
    link: Mutex<Option<Link>>,
    connected: AtomicBool,
    next_id: AtomicU64,
}

impl VirtualInterface {
    pub fn new(domain: impl Into<String>, options: OptionSet) -> Self {
        let interface = Self {
            domain: domain.into(),
            options: RwLock::new(options),
            levels: Arc::new(Mutex::new(BTreeMap::new())),
            sink: Arc::new(EventSinkSlot::new()),
            replies: PendingReplies::new(),
            link: Mutex::new(None),
            connected: AtomicBool::new(false),
            next_id: AtomicU64::new(1),
        };
        interface.sync_modules();
        interface
    }

    /// Current level of `address` in `0.0..=1.0`.
    pub fn level(&self, address: &str) -> Option<f64> {
        self.levels.lock().get(address).copied()
    }

    fn module_addresses(&self) -> Vec<String> {
        let options = self.options.read();
        let raw = match options.get("Modules") {
            Some(option) => option.value.clone(),
            None => DEFAULT_MODULES.to_string(),
        };
        raw.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Align the level table with the `Modules` option. Returns true if it changed.
    fn sync_modules(&self) -> bool {
        let addresses = self.module_addresses();
        let mut levels = self.levels.lock();
        let before = levels.len();
        levels.retain(|address, _| addresses.contains(address));
        let mut changed = levels.len() != before;
        for address in addresses {
            if !levels.contains_key(&address) {
                levels.insert(address, 0.0);
                changed = true;
            }
        }
        changed
    }

    fn millis_option(&self, name: &str) -> Duration {
        let value = self.options.read().value(name).trim().parse().unwrap_or(0);
        Duration::from_millis(value)
    }

    fn secs_option(&self, name: &str) -> Duration {
        let value = self.options.read().value(name).trim().parse().unwrap_or(0);
        Duration::from_secs(value)
    }

    /// Send a level to the link and wait for its acknowledgement.
    async fn transmit(&self, level: f64) -> Result<f64> {
        let tx = self
            .link
            .lock()
            .as_ref()
            .map(|link| link.tx.clone())
            .ok_or_else(|| InterfaceError::not_connected(&self.domain))?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed).to_string();
        let handle = self.replies.register(id.clone());
        if tx.send(Frame { id: id.clone(), level }).await.is_err() {
            self.replies.cancel(&id);
            return Err(InterfaceError::not_connected(&self.domain));
        }

        handle
            .wait(REPLY_TIMEOUT + self.millis_option("Latency"))
            .await
    }

    fn report_levels(domain: &str, levels: &Mutex<BTreeMap<String, f64>>, sink: &EventSinkSlot) {
        let snapshot: Vec<(String, f64)> = levels
            .lock()
            .iter()
            .map(|(address, level)| (address.clone(), *level))
            .collect();
        for (address, level) in snapshot {
            sink.property_changed(Event::new(
                domain,
                address,
                MODULE_DESCRIPTION,
                LEVEL_PROPERTY,
                level,
            ));
        }
    }
}

async fn run_link(
    mut rx: mpsc::Receiver<Frame>,
    replies: PendingReplies<f64>,
    latency: Duration,
) {
    while let Some(frame) = rx.recv().await {
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if !replies.complete(&frame.id, frame.level.clamp(0.0, 1.0)) {
            debug!(id = %frame.id, "acknowledgement arrived after the caller gave up");
        }
    }
}

#[async_trait]
impl MigInterface for VirtualInterface {
    fn domain(&self) -> &str {
        &self.domain
    }

    async fn on_set_option(&self, option: &MigOption) -> Result<()> {
        self.options.write().set(option.name.clone(), option.value.clone());
        if option.name == "Modules" && self.sync_modules() {
            self.sink.modules_changed(self.domain.clone());
        }
        Ok(())
    }

    async fn connect(&self) -> Result<()> {
        if !self.is_device_present() {
            return Err(InterfaceError::DeviceNotPresent(self.domain.clone()));
        }

        let mut link = self.link.lock();
        if link.is_some() {
            return Ok(());
        }

        let (tx, rx) = mpsc::channel(16);
        let device = tokio::spawn(run_link(
            rx,
            self.replies.clone(),
            self.millis_option("Latency"),
        ));

        let interval = self.secs_option("ReportInterval");
        let reporter = (!interval.is_zero()).then(|| {
            let domain = self.domain.clone();
            let levels = Arc::clone(&self.levels);
            let sink = Arc::clone(&self.sink);
            TimerTask::periodic(interval, move || {
                VirtualInterface::report_levels(&domain, &levels, &sink);
                async {}
            })
        });

        *link = Some(Link {
            tx,
            device,
            _reporter: reporter,
        });
        self.connected.store(true, Ordering::SeqCst);
        info!(domain = %self.domain, "virtual interface connected");
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        let link = self.link.lock().take();
        if let Some(link) = link {
            link.device.abort();
            self.replies.cancel_all();
            info!(domain = %self.domain, "virtual interface disconnected");
        }
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn is_device_present(&self) -> bool {
        !parse_bool(self.options.read().value("Offline"))
    }

    async fn get_modules(&self) -> Vec<InterfaceModule> {
        self.levels
            .lock()
            .keys()
            .map(|address| {
                InterfaceModule::new(&self.domain, address, ModuleType::Dimmer)
                    .with_description(MODULE_DESCRIPTION)
            })
            .collect()
    }

    async fn interface_control(&self, command: &Command) -> Result<Option<ResponseData>> {
        if !self.is_connected() {
            return Err(InterfaceError::not_connected(&self.domain));
        }

        let address = command.address();
        let current = self.level(address).ok_or_else(|| {
            InterfaceError::InvalidArgument(format!("unknown module '{}'", address))
        })?;

        let target = match command.command() {
            "Control.On" => 1.0,
            "Control.Off" => 0.0,
            "Control.Toggle" => {
                if current > 0.0 {
                    0.0
                } else {
                    1.0
                }
            }
            "Control.Level" => {
                let raw = command.option(0);
                let percent: f64 = raw.trim().parse().map_err(|_| {
                    InterfaceError::InvalidArgument(format!("invalid level '{}'", raw))
                })?;
                (percent / 100.0).clamp(0.0, 1.0)
            }
            LEVEL_PROPERTY => {
                return Ok(Some(ResponseText::new(current.to_string()).into()));
            }
            other => return Err(InterfaceError::UnknownCommand(other.to_string())),
        };

        let level = self.transmit(target).await?;
        self.levels.lock().insert(address.to_string(), level);
        self.sink.property_changed(Event::new(
            &self.domain,
            address,
            MODULE_DESCRIPTION,
            LEVEL_PROPERTY,
            level,
        ));

        Ok(Some(ResponseStatus::ok().into()))
    }

    fn set_event_sink(&self, sink: InterfaceEventSink) {
        self.sink.set(sink);
    }
}

/// Factory for [`VirtualInterface`].
#[derive(Debug, Default)]
pub struct VirtualInterfaceFactory;

#[async_trait]
impl InterfaceFactory for VirtualInterfaceFactory {
    async fn create(&self, domain: &str, options: &OptionSet) -> Result<Arc<dyn MigInterface>> {
        Ok(Arc::new(VirtualInterface::new(domain, options.clone())))
    }

    fn interface_type(&self) -> &str {
        VIRTUAL_INTERFACE_TYPE
    }
}
