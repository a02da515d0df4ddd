#![forbid(unsafe_code)]

//! Buttons that only launch a command.

use statebar_reactive::Binding;

use crate::context::BarContext;
use crate::resources::launch_command;
use crate::segment::Segment;

pub const APPS_GLYPH: &str = "󰀻";
pub const POWER_ICON: &str = "system-shutdown-symbolic";

#[derive(Debug)]
pub struct Launcher {
    ctx: BarContext,
    name: &'static str,
    command: String,
    segment: Segment,
}

impl Launcher {
    /// Application launcher (rofi by default).
    #[must_use]
    pub fn applications(ctx: &BarContext) -> Self {
        Self {
            ctx: ctx.clone(),
            name: "apps",
            command: ctx.config().commands.launcher.clone(),
            segment: Segment::new("apps")
                .class("apps")
                .label(Binding::constant(APPS_GLYPH.to_string())),
        }
    }

    #[must_use]
    pub fn power_menu(ctx: &BarContext) -> Self {
        Self {
            ctx: ctx.clone(),
            name: "power",
            command: ctx.config().commands.power_menu.clone(),
            segment: Segment::new("power")
                .class("power")
                .icon(Binding::constant(POWER_ICON.to_string())),
        }
    }

    #[must_use]
    pub fn command(&self) -> &str {
        &self.command
    }

    /// Click action.
    pub fn activate(&self) {
        launch_command(&self.ctx, self.name, self.command.clone());
    }

    #[must_use]
    pub fn segment(&self) -> Segment {
        self.segment.clone()
    }
}
