// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the process-wide filter registry

use image_effect::buffer::EffectBuffer;
use image_effect::filters::{DelegateInfo, ParamMap, registry};
use image_effect::telemetry::{EventReporter, TelemetryEvent};
use image_effect::{FilterDelegate, ParamValue, PixelFormat};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Lists the registry from inside every report
#[derive(Debug, Default)]
struct ListingReporter {
    seen: Mutex<Vec<Vec<String>>>,
}

impl EventReporter for ListingReporter {
    fn report(&self, _event: TelemetryEvent) {
        let names = registry::lookup("Default");
        if let Ok(mut seen) = self.seen.lock() {
            seen.push(names);
        }
    }
}

#[derive(Debug)]
struct Invert;

impl FilterDelegate for Invert {
    fn set_value(&self, _key: &str, _value: &ParamValue) -> bool {
        true
    }

    fn render(&self, _buffer: &mut EffectBuffer, _params: &ParamMap) -> bool {
        true
    }
}

#[test]
fn test_reporter_can_query_registry() {
    let reporter = Arc::new(ListingReporter::default());
    registry::init(reporter.clone()).unwrap();

    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let info = DelegateInfo::new("InvertReporting", &[PixelFormat::Rgba8888]);
        tx.send(registry::register_delegate(info, Arc::new(Invert))).ok();
    });
    let outcome = rx
        .recv_timeout(Duration::from_secs(5))
        .expect("register_delegate did not return");
    outcome.unwrap();

    let seen = reporter.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert!(seen[0].contains(&"InvertReporting".to_string()));
    registry::teardown().unwrap();
}
