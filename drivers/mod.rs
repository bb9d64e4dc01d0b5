//! Device and driver-binding framework
//!
//! A small device-tree-flavored registry: devices carry a `compatible`
//! string list, a handful of resources and integer properties, and an
//! opaque driver-data slot; drivers match by compatible string and are
//! scored, Linux-probe-style, so the best match wins (§4.6, §6).

use alloc::sync::Arc;
use alloc::string::String;
use core::any::Any;

use crate::kcore::sync::SpinLock;
use crate::Result;

pub mod platform;

/// Device type identifier. Most of this crate only ever registers
/// `InterruptController` devices, but the registry itself is generic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceType {
    Unknown,
    Platform,
    InterruptController,
}

/// Device resource types (§6: `device_get_resource`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    /// Memory-mapped I/O region.
    Mem,
    /// IRQ resource.
    Irq,
}

/// A single device resource: an address or number range.
#[derive(Debug, Clone)]
pub struct DeviceResource {
    pub resource_type: ResourceType,
    pub start: u64,
    pub end: u64,
    pub name: String,
}

impl DeviceResource {
    pub fn new(resource_type: ResourceType, start: u64, end: u64, name: &str) -> Self {
        Self {
            resource_type,
            start,
            end,
            name: name.into(),
        }
    }

    pub fn size(&self) -> u64 {
        if self.start <= self.end {
            self.end - self.start + 1
        } else {
            0
        }
    }
}

/// A device-tree-bound device: a name, a compatible-string list, its
/// resources, a small integer property table, and an opaque slot for
/// whatever the bound driver wants to stash there.
pub struct Device {
    name: String,
    compatible: alloc::vec::Vec<String>,
    resources: alloc::vec::Vec<DeviceResource>,
    properties: alloc::vec::Vec<(String, u32)>,
    driver_data: SpinLock<Option<Arc<dyn Any + Send + Sync>>>,
}

impl Device {
    pub fn new(name: &str, compatible: &[&str]) -> Self {
        Self {
            name: name.into(),
            compatible: compatible.iter().map(|s| String::from(*s)).collect(),
            resources: alloc::vec::Vec::new(),
            properties: alloc::vec::Vec::new(),
            driver_data: SpinLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compatible(&self) -> &[String] {
        &self.compatible
    }

    pub fn is_compatible_with(&self, needle: &str) -> bool {
        self.compatible.iter().any(|c| c == needle)
    }

    pub fn add_resource(&mut self, resource: DeviceResource) {
        self.resources.push(resource);
    }

    /// `device_get_resource(dev, type, index)`: the `index`-th resource of
    /// `resource_type`, if any.
    pub fn get_resource(&self, resource_type: ResourceType, index: usize) -> Option<&DeviceResource> {
        self.resources
            .iter()
            .filter(|r| r.resource_type == resource_type)
            .nth(index)
    }

    pub fn set_property_u32(&mut self, key: &str, value: u32) {
        self.properties.push((key.into(), value));
    }

    /// `device_get_property_u32(dev, key, default)`.
    pub fn get_property_u32(&self, key: &str, default: u32) -> u32 {
        self.properties
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
            .unwrap_or(default)
    }

    /// `device_set_driver_data(dev, ptr)`.
    pub fn set_driver_data<T: Any + Send + Sync>(&self, data: Arc<T>) {
        *self.driver_data.lock() = Some(data as Arc<dyn Any + Send + Sync>);
    }

    /// Retrieve driver data previously stashed with `set_driver_data`,
    /// downcast to `T`.
    pub fn driver_data<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        self.driver_data
            .lock()
            .as_ref()
            .and_then(|d| d.clone().downcast::<T>().ok())
    }
}

/// Probe returned no match.
pub const PROBE_SCORE_NONE: u32 = 0;
/// Probe returned an exact compatible-string match.
pub const PROBE_SCORE_EXACT: u32 = 100;

/// Driver-binding interface (§4.6, §6). Unlike a generic `DeviceOps`
/// trait-object model, binding here is purely compatible-string driven:
/// the registry asks every registered driver to score a device and binds
/// the highest scorer.
pub trait Driver: Send + Sync {
    /// Driver name.
    fn name(&self) -> &'static str;

    /// Score this device, 0 meaning "no match". `PROBE_SCORE_EXACT` is the
    /// conventional score for a compatible-string hit.
    fn probe(&self, device: &Device) -> u32;

    /// Bind the driver to a device that scored above zero.
    fn attach(&self, device: &Device) -> Result<()>;

    /// Unbind. IMSIC's driver always fails this (§4.6); the default here
    /// does too, since "detach" is meaningless for process-lifetime
    /// singleton hardware in general.
    fn detach(&self, device: &Device) -> Result<()> {
        let _ = device;
        Err(crate::Error::Driver(Error::NotSupported))
    }
}

/// Driver-subsystem error type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// No registered driver scored above zero for this device.
    NoMatchingDriver,
    /// Missing hardware resource (e.g. no MMIO region).
    MissingResource,
    /// The primary controller is already initialized (§4.5 singleton).
    AlreadyInitialized,
    /// The operation is not supported by this driver (e.g. detach).
    NotSupported,
}

/// Registry of devices and the drivers bound to them.
pub struct DeviceManager {
    devices: SpinLock<alloc::vec::Vec<Arc<Device>>>,
    drivers: SpinLock<alloc::vec::Vec<Arc<dyn Driver>>>,
}

impl DeviceManager {
    pub const fn new() -> Self {
        Self {
            devices: SpinLock::new(alloc::vec::Vec::new()),
            drivers: SpinLock::new(alloc::vec::Vec::new()),
        }
    }

    pub fn register_device(&self, device: Arc<Device>) {
        crate::info!("registered device '{}'", device.name());
        self.devices.lock().push(device);
    }

    pub fn register_driver(&self, driver: Arc<dyn Driver>) {
        crate::info!("registered driver '{}'", driver.name());
        self.drivers.lock().push(driver);
    }

    /// Probe every registered device against every registered driver, and
    /// attach the best-scoring match (ties broken by registration order),
    /// per the early-priority built-in module hook described in §4.6.
    pub fn probe_and_bind(&self) -> Result<()> {
        let devices = self.devices.lock();
        let drivers = self.drivers.lock();

        for device in devices.iter() {
            let best = drivers
                .iter()
                .map(|d| (d.probe(device), d))
                .filter(|(score, _)| *score > PROBE_SCORE_NONE)
                .max_by_key(|(score, _)| *score);

            match best {
                Some((_, driver)) => {
                    crate::info!("binding device '{}' to driver '{}'", device.name(), driver.name());
                    driver.attach(device)?;
                }
                None => {
                    crate::debug!("no driver matched device '{}'", device.name());
                }
            }
        }

        Ok(())
    }
}

impl Default for DeviceManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Global device manager instance.
static DEVICE_MANAGER: DeviceManager = DeviceManager::new();

/// Get the global device manager.
pub fn manager() -> &'static DeviceManager {
    &DEVICE_MANAGER
}

/// Initialize the device management subsystem.
pub fn init() -> Result<()> {
    crate::info!("initializing device management");
    platform::init()?;
    Ok(())
}
