// SPDX-License-Identifier: GPL-3.0-only

//! Filter registry: built-in constructors plus registered delegates
//!
//! The process-wide registry sits behind one mutex; every operation on it
//! goes through the functions at the bottom of this module.

use super::delegate::{DelegateFilter, DelegateInfo, FilterDelegate};
use super::{Brightness, Contrast, EffectInfo, Filter, brightness, contrast};
use crate::buffer::PixelFormat;
use crate::constants::{
    EVENT_REGISTER_CUSTOM_FILTER, LOOKUP_CATEGORY_PREFIX, LOOKUP_DEFAULT, LOOKUP_FORMAT_PREFIX,
    MAX_FILTER_NAME_LEN,
};
use crate::errors::{EffectError, EffectResult};
use crate::telemetry::{EventReporter, TelemetryEvent, TracingReporter};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use tracing::{debug, info, warn};

struct Builtin {
    name: &'static str,
    create: fn() -> Box<dyn Filter>,
    info: fn() -> Arc<EffectInfo>,
}

fn create_brightness() -> Box<dyn Filter> {
    Box::new(Brightness::new())
}

fn create_contrast() -> Box<dyn Filter> {
    Box::new(Contrast::new())
}

static BUILTINS: [Builtin; 2] = [
    Builtin {
        name: brightness::NAME,
        create: create_brightness,
        info: brightness::effect_info,
    },
    Builtin {
        name: contrast::NAME,
        create: create_contrast,
        info: contrast::effect_info,
    },
];

fn builtin(name: &str) -> Option<&'static Builtin> {
    BUILTINS.iter().find(|b| b.name == name)
}

#[derive(Debug, Clone)]
struct DelegateEntry {
    info: Arc<DelegateInfo>,
    effect_info: Arc<EffectInfo>,
    delegate: Arc<dyn FilterDelegate>,
}

#[derive(Debug)]
pub struct FilterRegistry {
    delegates: BTreeMap<String, DelegateEntry>,
    reporter: Arc<dyn EventReporter>,
}

impl Default for FilterRegistry {
    fn default() -> Self {
        Self::new(Arc::new(TracingReporter))
    }
}

impl FilterRegistry {
    pub fn new(reporter: Arc<dyn EventReporter>) -> Self {
        Self {
            delegates: BTreeMap::new(),
            reporter,
        }
    }

    /// New independent instance of the named filter
    pub fn create(&self, name: &str) -> Option<Box<dyn Filter>> {
        if let Some(builtin) = builtin(name) {
            return Some((builtin.create)());
        }
        if let Some(entry) = self.delegates.get(name) {
            return Some(Box::new(DelegateFilter::new(
                Arc::clone(&entry.info),
                Arc::clone(&entry.effect_info),
                Arc::clone(&entry.delegate),
            )));
        }
        debug!(name, "No filter registered under name");
        None
    }

    /// Install a third-party filter under `info.name`, replacing an earlier
    /// delegate of the same name
    pub fn register_delegate(
        &mut self,
        info: DelegateInfo,
        delegate: Arc<dyn FilterDelegate>,
    ) -> EffectResult<()> {
        let event = self.insert_delegate(info, delegate)?;
        self.reporter.report(event);
        Ok(())
    }

    /// Validate and store a delegate, returning the event to report once
    /// the caller no longer holds the registry lock
    fn insert_delegate(
        &mut self,
        info: DelegateInfo,
        delegate: Arc<dyn FilterDelegate>,
    ) -> EffectResult<TelemetryEvent> {
        if info.name.is_empty() {
            return Err(EffectError::InputNull("filter name"));
        }
        if info.name.len() >= MAX_FILTER_NAME_LEN {
            return Err(EffectError::InvalidParameter(format!(
                "filter name of {} bytes exceeds {}",
                info.name.len(),
                MAX_FILTER_NAME_LEN - 1
            )));
        }
        if info.formats.is_empty() {
            return Err(EffectError::InvalidParameter(format!(
                "{} declares no pixel formats",
                info.name
            )));
        }
        if builtin(&info.name).is_some() {
            warn!(name = %info.name, "Delegate name clashes with a built-in filter");
            return Err(EffectError::InvalidParameter(format!(
                "{} is a built-in filter",
                info.name
            )));
        }

        let event = TelemetryEvent::new(EVENT_REGISTER_CUSTOM_FILTER)
            .with_field("name", info.name.clone())
            .with_field("formats", info.formats_label());
        let entry = DelegateEntry {
            effect_info: Arc::new(info.effect_info()),
            info: Arc::new(info),
            delegate,
        };
        let name = entry.info.name.clone();
        if self.delegates.insert(name.clone(), entry).is_some() {
            info!(name = %name, "Replaced registered delegate");
        } else {
            info!(name = %name, "Registered delegate filter");
        }
        Ok(event)
    }

    pub fn unregister(&mut self, name: &str) -> bool {
        self.delegates.remove(name).is_some()
    }

    pub fn effect_info(&self, name: &str) -> Option<Arc<EffectInfo>> {
        builtin(name)
            .map(|b| (b.info)())
            .or_else(|| {
                self.delegates
                    .get(name)
                    .map(|entry| Arc::clone(&entry.effect_info))
            })
    }

    /// Built-in names followed by delegate names
    pub fn names(&self) -> Vec<String> {
        BUILTINS
            .iter()
            .map(|b| b.name.to_string())
            .chain(self.delegates.keys().cloned())
            .collect()
    }

    /// Names matching `key`: `Default` lists everything, `Category:<name>`
    /// and `Format:<name>` filter by capability, anything else is a
    /// substring match
    pub fn lookup(&self, key: &str) -> Vec<String> {
        if key == LOOKUP_DEFAULT {
            return self.names();
        }
        if let Some(category) = key.strip_prefix(LOOKUP_CATEGORY_PREFIX) {
            return self.names_where(|info| info.category.name().eq_ignore_ascii_case(category));
        }
        if let Some(format) = key.strip_prefix(LOOKUP_FORMAT_PREFIX) {
            let Some(format) = PixelFormat::from_name(format) else {
                debug!(format, "Unknown pixel format in lookup");
                return Vec::new();
            };
            return self.names_where(|info| info.supports_format(format));
        }
        self.names()
            .into_iter()
            .filter(|name| name.contains(key))
            .collect()
    }

    fn names_where(&self, predicate: impl Fn(&EffectInfo) -> bool) -> Vec<String> {
        self.names()
            .into_iter()
            .filter(|name| self.effect_info(name).is_some_and(|info| predicate(&info)))
            .collect()
    }

    pub fn delegate_count(&self) -> usize {
        self.delegates.len()
    }

    /// Forget every delegate
    pub fn release_all(&mut self) {
        if !self.delegates.is_empty() {
            info!(count = self.delegates.len(), "Releasing registered delegates");
        }
        self.delegates.clear();
    }
}

/// Process-wide registry, created on first use and dropped by [`teardown`]
static REGISTRY: OnceLock<Mutex<Option<FilterRegistry>>> = OnceLock::new();

fn slot() -> EffectResult<MutexGuard<'static, Option<FilterRegistry>>> {
    REGISTRY
        .get_or_init(|| Mutex::new(None))
        .lock()
        .map_err(|_| EffectError::InvalidParameter("filter registry lock poisoned".into()))
}

/// Run `f` on the process-wide registry
pub fn with_registry<T>(f: impl FnOnce(&mut FilterRegistry) -> T) -> EffectResult<T> {
    let mut slot = slot()?;
    let registry = slot.get_or_insert_with(FilterRegistry::default);
    Ok(f(registry))
}

/// Replace the process-wide registry with one reporting to `reporter`
pub fn init(reporter: Arc<dyn EventReporter>) -> EffectResult<()> {
    *slot()? = Some(FilterRegistry::new(reporter));
    Ok(())
}

/// Drop the process-wide registry and every delegate in it
pub fn teardown() -> EffectResult<()> {
    if let Some(mut registry) = slot()?.take() {
        registry.release_all();
    }
    Ok(())
}

pub fn create(name: &str) -> Option<Box<dyn Filter>> {
    with_registry(|registry| registry.create(name)).ok().flatten()
}

pub fn register_delegate(
    info: DelegateInfo,
    delegate: Arc<dyn FilterDelegate>,
) -> EffectResult<()> {
    let (event, reporter) = with_registry(|registry| {
        registry
            .insert_delegate(info, delegate)
            .map(|event| (event, Arc::clone(&registry.reporter)))
    })??;
    // Reporters may call back into the registry
    reporter.report(event);
    Ok(())
}

pub fn lookup(key: &str) -> Vec<String> {
    with_registry(|registry| registry.lookup(key)).unwrap_or_default()
}

pub fn effect_info(name: &str) -> Option<Arc<EffectInfo>> {
    with_registry(|registry| registry.effect_info(name)).ok().flatten()
}

pub fn release_all() -> EffectResult<()> {
    with_registry(FilterRegistry::release_all)
}
