#![forbid(unsafe_code)]

//! Date/time segment. Clicking toggles between local time and UTC.

use chrono::{DateTime, Local, Utc};
use statebar_reactive::{Binding, Observable, bind2};
use statebar_runtime::{Poll, PollerHandle, Result};

use crate::config::millis;
use crate::context::BarContext;
use crate::segment::Segment;

pub const CLOCK_FORMAT: &str = "%H:%M:%S %a %d %b %Y";
pub const CLOCK_ICON: &str = "preferences-system-time-symbolic";

/// Render `now` in UTC or in the local time zone.
#[must_use]
pub fn format_clock(now: &DateTime<Utc>, utc: bool) -> String {
    if utc {
        now.format(CLOCK_FORMAT).to_string()
    } else {
        now.with_timezone(&Local).format(CLOCK_FORMAT).to_string()
    }
}

pub struct Clock {
    now: Observable<DateTime<Utc>>,
    show_utc: Observable<bool>,
    label: Binding<String>,
    _poller: PollerHandle,
}

impl Clock {
    pub fn new(ctx: &BarContext) -> Result<Self> {
        let now = Observable::new(Utc::now());
        let show_utc = Observable::new(false);
        let label = bind2(&now, &show_utc, |now: &DateTime<Utc>, utc: &bool| {
            format_clock(now, *utc)
        });
        let poller = Poll::every(millis(ctx.config().intervals.clock_ms))
            .name("clock")
            .spawn_into(
                ctx.runtime(),
                |_| Ok::<_, std::convert::Infallible>(Utc::now()),
                &now,
            )?;
        Ok(Self {
            now,
            show_utc,
            label,
            _poller: poller,
        })
    }

    /// Click action.
    pub fn toggle_utc(&self) {
        self.show_utc.update(|utc| *utc = !*utc);
    }

    #[must_use]
    pub fn shows_utc(&self) -> bool {
        self.show_utc.get()
    }

    #[must_use]
    pub fn label(&self) -> &Binding<String> {
        &self.label
    }

    /// The polled instant.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }

    #[must_use]
    pub fn segment(&self) -> Segment {
        Segment::new("clock")
            .class("clock")
            .icon(Binding::constant(CLOCK_ICON.to_string()))
            .label(self.label.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn utc_format_matches_layout() {
        let at = Utc
            .with_ymd_and_hms(2024, 3, 9, 7, 5, 3)
            .single()
            .expect("valid date");
        assert_eq!(format_clock(&at, true), "07:05:03 Sat 09 Mar 2024");
    }

    #[test]
    fn local_format_uses_local_zone() {
        let at = Utc
            .with_ymd_and_hms(2024, 12, 31, 23, 59, 59)
            .single()
            .expect("valid date");
        let expected = at.with_timezone(&Local).format(CLOCK_FORMAT).to_string();
        assert_eq!(format_clock(&at, false), expected);
    }
}
