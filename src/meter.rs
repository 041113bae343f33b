//! Mapping from a source plugin to the metric name and unit its values are
//! stored under.

use std::collections::HashMap;

use crate::{event::MeasurementEvent, MetricKey};

pub trait MeterNaming: core::fmt::Debug + Send + Sync {
    fn meter_name(&self, event: &MeasurementEvent) -> MetricKey;
    fn unit(&self, event: &MeasurementEvent) -> Option<String>;
}

/// `plugin.type`, with units looked up by `plugin.type` and then `plugin`.
#[derive(Debug, Clone, Default)]
pub struct DefaultMeter {
    units: HashMap<String, String>,
}
impl DefaultMeter {
    pub fn new(units: HashMap<String, String>) -> Self {
        Self { units }
    }
}
impl MeterNaming for DefaultMeter {
    fn meter_name(&self, event: &MeasurementEvent) -> MetricKey {
        [event.plugin.as_str(), event.kind.as_str()]
            .into_iter()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(".")
    }

    fn unit(&self, event: &MeasurementEvent) -> Option<String> {
        let qualified = format!("{}.{}", event.plugin, event.kind);
        self.units
            .get(&qualified)
            .or_else(|| self.units.get(&event.plugin))
            .cloned()
    }
}

/// Pins the name and/or unit of one plugin, deferring the rest to the default.
#[derive(Debug, Clone)]
pub struct FixedMeter {
    name: Option<MetricKey>,
    unit: Option<String>,
    fallback: DefaultMeter,
}
impl FixedMeter {
    pub fn new(name: Option<MetricKey>, unit: Option<String>, fallback: DefaultMeter) -> Self {
        Self {
            name,
            unit,
            fallback,
        }
    }
}
impl MeterNaming for FixedMeter {
    fn meter_name(&self, event: &MeasurementEvent) -> MetricKey {
        match &self.name {
            Some(name) => name.clone(),
            None => self.fallback.meter_name(event),
        }
    }

    fn unit(&self, event: &MeasurementEvent) -> Option<String> {
        self.unit.clone().or_else(|| self.fallback.unit(event))
    }
}

#[derive(Debug, Default)]
pub struct Meters {
    plugins: HashMap<String, Box<dyn MeterNaming>>,
    default: DefaultMeter,
}
impl Meters {
    pub fn new(default: DefaultMeter) -> Self {
        Self {
            plugins: HashMap::new(),
            default,
        }
    }

    pub fn register(&mut self, plugin: impl Into<String>, meter: Box<dyn MeterNaming>) {
        self.plugins.insert(plugin.into(), meter);
    }

    pub fn get(&self, plugin: &str) -> &dyn MeterNaming {
        match self.plugins.get(plugin) {
            Some(meter) => meter.as_ref(),
            None => &self.default,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn event(plugin: &str, kind: &str) -> MeasurementEvent {
        MeasurementEvent {
            plugin: plugin.into(),
            kind: kind.into(),
            ..Default::default()
        }
    }

    #[test]
    fn test_default_name_skips_empty_parts() {
        let meter = DefaultMeter::default();
        assert_eq!(meter.meter_name(&event("cpu", "percent")), "cpu.percent");
        assert_eq!(meter.meter_name(&event("uptime", "")), "uptime");
    }

    #[test]
    fn test_default_unit_prefers_qualified_key() {
        let units = HashMap::from([
            ("memory".to_string(), "B".to_string()),
            ("memory.percent".to_string(), "%".to_string()),
        ]);
        let meter = DefaultMeter::new(units);
        assert_eq!(meter.unit(&event("memory", "percent")).as_deref(), Some("%"));
        assert_eq!(meter.unit(&event("memory", "memory")).as_deref(), Some("B"));
        assert_eq!(meter.unit(&event("disk", "octets")), None);
    }

    #[test]
    fn test_unknown_plugin_falls_back_to_default() {
        let mut meters = Meters::default();
        meters.register(
            "load",
            Box::new(FixedMeter::new(
                Some("cpu.load".into()),
                Some("percent".into()),
                DefaultMeter::default(),
            )),
        );
        let load = event("load", "load");
        assert_eq!(meters.get("load").meter_name(&load), "cpu.load");
        assert_eq!(meters.get("load").unit(&load).as_deref(), Some("percent"));
        let disk = event("disk", "octets");
        assert_eq!(meters.get("disk").meter_name(&disk), "disk.octets");
    }
}
