#![forbid(unsafe_code)]

//! View models read by the presentation layer.

use serde::Serialize;
use statebar_reactive::{Binding, Subscription};

/// One visual element of the bar: a label with optional icon and tooltip.
#[derive(Clone)]
pub struct Segment {
    pub name: &'static str,
    pub css_classes: Vec<&'static str>,
    pub icon: Option<Binding<String>>,
    pub label: Option<Binding<String>>,
    pub tooltip: Option<Binding<String>>,
    pub visible: Option<Binding<bool>>,
}

impl Segment {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            css_classes: vec!["bar-section"],
            icon: None,
            label: None,
            tooltip: None,
            visible: None,
        }
    }

    #[must_use]
    pub fn class(mut self, class: &'static str) -> Self {
        self.css_classes.push(class);
        self
    }

    #[must_use]
    pub fn icon(mut self, icon: Binding<String>) -> Self {
        self.icon = Some(icon);
        self
    }

    #[must_use]
    pub fn label(mut self, label: Binding<String>) -> Self {
        self.label = Some(label);
        self
    }

    #[must_use]
    pub fn tooltip(mut self, tooltip: Binding<String>) -> Self {
        self.tooltip = Some(tooltip);
        self
    }

    #[must_use]
    pub fn visible(mut self, visible: Binding<bool>) -> Self {
        self.visible = Some(visible);
        self
    }

    /// Current values of every binding.
    #[must_use]
    pub fn snapshot(&self) -> SegmentSnapshot {
        SegmentSnapshot {
            name: self.name,
            css_classes: self.css_classes.clone(),
            icon: self.icon.as_ref().map(Binding::current),
            label: self.label.as_ref().map(Binding::current),
            tooltip: self.tooltip.as_ref().map(Binding::current),
            visible: self.visible.as_ref().is_none_or(Binding::current),
        }
    }

    /// Invoke `callback` whenever any binding of this segment changes.
    pub fn on_change(&self, callback: impl Fn() + 'static) -> Vec<Subscription> {
        let callback = std::rc::Rc::new(callback);
        let mut subs = Vec::new();
        for text in [&self.icon, &self.label, &self.tooltip].into_iter().flatten() {
            let cb = std::rc::Rc::clone(&callback);
            subs.push(text.subscribe(move |_, _| cb()));
        }
        if let Some(visible) = &self.visible {
            let cb = std::rc::Rc::clone(&callback);
            subs.push(visible.subscribe(move |_, _| cb()));
        }
        subs
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("name", &self.name)
            .field("snapshot", &self.snapshot())
            .finish()
    }
}

/// Plain-data copy of a [`Segment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SegmentSnapshot {
    pub name: &'static str,
    pub css_classes: Vec<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tooltip: Option<String>,
    pub visible: bool,
}

impl SegmentSnapshot {
    /// Single-line rendering used by the headless runner.
    #[must_use]
    pub fn to_line(&self) -> String {
        let mut line = format!("[{}]", self.name);
        if let Some(icon) = &self.icon {
            line.push_str(&format!(" <{icon}>"));
        }
        if let Some(label) = &self.label {
            line.push(' ');
            line.push_str(label);
        }
        if let Some(tooltip) = &self.tooltip {
            line.push_str(&format!(" ({tooltip})"));
        }
        if !self.visible {
            line.push_str(" [hidden]");
        }
        line
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use statebar_reactive::{Observable, bind};
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn snapshot_reads_bindings() {
        let value = Observable::new(3);
        let segment = Segment::new("demo")
            .class("demo")
            .label(bind(&value, |v| format!("{v}%")))
            .visible(bind(&value, |v| *v > 0));
        let snap = segment.snapshot();
        assert_eq!(snap.label.as_deref(), Some("3%"));
        assert!(snap.visible);
        assert_eq!(snap.css_classes, vec!["bar-section", "demo"]);
        assert_eq!(snap.to_line(), "[demo] 3%");

        value.set(0);
        assert_eq!(segment.snapshot().to_line(), "[demo] 0% [hidden]");
    }

    #[test]
    fn on_change_fires_per_binding_change() {
        let value = Observable::new(1);
        let segment = Segment::new("demo")
            .label(bind(&value, |v| v.to_string()))
            .tooltip(bind(&value, |v| format!("value {v}")));
        let hits = Rc::new(Cell::new(0));
        let h = Rc::clone(&hits);
        let _subs = segment.on_change(move || h.set(h.get() + 1));
        value.set(2);
        assert_eq!(hits.get(), 2);
    }

    #[test]
    fn snapshot_serializes_without_empty_fields() {
        let value = Observable::new("x".to_string());
        let segment = Segment::new("demo").label(bind(&value, String::clone));
        let json = serde_json::to_value(segment.snapshot()).expect("json");
        assert_eq!(json["label"], "x");
        assert!(json.get("icon").is_none());
    }
}
