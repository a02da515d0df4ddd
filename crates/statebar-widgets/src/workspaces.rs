#![forbid(unsafe_code)]

//! niri workspaces and the windows on them.
//!
//! Workspaces and windows are polled together into one [`CompositorState`]
//! so a projection never pairs a new workspace list with stale windows.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use statebar_reactive::{Binding, Observable, bind};
use statebar_runtime::{CommandRunner, Poll, PollerHandle, Result, SharedRunner, Task, TaskHandle};
use thiserror::Error;
use tracing::debug;

use crate::config::millis;
use crate::context::BarContext;
use crate::segment::Segment;

pub const EMPTY_WORKSPACE_ICON: &str = "archlinux-logo";
/// Shown for windows that report no app id.
pub const UNKNOWN_APP_ICON: &str = "application-x-executable";

/// One entry of `niri msg -j workspaces`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workspace {
    pub id: u64,
    pub idx: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub is_focused: bool,
}

/// One entry of `niri msg -j windows`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub id: u64,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub app_id: Option<String>,
    #[serde(default)]
    pub workspace_id: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompositorState {
    pub workspaces: Vec<Workspace>,
    pub windows: Vec<Window>,
}

#[derive(Debug, Error)]
pub enum CompositorError {
    #[error(transparent)]
    Shell(#[from] statebar_runtime::ShellError),

    #[error("unreadable `{command}` output: {source}")]
    Json {
        command: String,
        #[source]
        source: serde_json::Error,
    },
}

fn query<T: for<'de> Deserialize<'de>>(
    runner: &dyn CommandRunner,
    cx: &statebar_runtime::Cx,
    command: &str,
) -> std::result::Result<T, CompositorError> {
    let out = runner.run(cx, command)?;
    serde_json::from_str(&out).map_err(|source| CompositorError::Json {
        command: command.to_string(),
        source,
    })
}

/// Icon name for a window's app id.
#[must_use]
pub fn app_icon(app_id: &str) -> String {
    let name = if app_id == "kitty" { "kitty-custom" } else { app_id };
    name.to_lowercase()
}

/// What the bar draws for one workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkspaceView {
    pub id: u64,
    pub idx: u32,
    pub css_classes: Vec<&'static str>,
    pub icons: Vec<String>,
}

impl WorkspaceView {
    #[must_use]
    pub fn is_highlighted(&self) -> bool {
        self.css_classes.contains(&"hl-workspace-active")
    }
}

/// Workspaces on `output` (all outputs when `None`), ordered by index.
#[must_use]
pub fn project(state: &CompositorState, output: Option<&str>) -> Vec<WorkspaceView> {
    let mut workspaces: Vec<&Workspace> = state
        .workspaces
        .iter()
        .filter(|ws| output.is_none_or(|o| ws.output.as_deref() == Some(o)))
        .collect();
    workspaces.sort_by_key(|ws| ws.idx);

    workspaces
        .into_iter()
        .map(|ws| {
            let mut css_classes = vec!["hl-workspace"];
            if ws.is_active && ws.is_focused {
                css_classes.push("hl-workspace-active");
            }
            let mut icons: Vec<String> = state
                .windows
                .iter()
                .filter(|w| w.workspace_id == Some(ws.id))
                .map(|w| app_icon(w.app_id.as_deref().unwrap_or(UNKNOWN_APP_ICON)))
                .collect();
            if icons.is_empty() && ws.is_active {
                icons.push(EMPTY_WORKSPACE_ICON.to_string());
            }
            WorkspaceView {
                id: ws.id,
                idx: ws.idx,
                css_classes,
                icons,
            }
        })
        .collect()
}

/// Compact text form: `1*:firefox,kitty-custom 2:`.
#[must_use]
pub fn render_views(views: &[WorkspaceView]) -> String {
    views
        .iter()
        .map(|v| {
            let mark = if v.is_highlighted() { "*" } else { "" };
            format!("{}{}:{}", v.idx, mark, v.icons.join(","))
        })
        .collect::<Vec<_>>()
        .join(" ")
}

pub struct Workspaces {
    ctx: BarContext,
    pub state: Observable<CompositorState>,
    views: Binding<Vec<WorkspaceView>>,
    label: Binding<String>,
    _poller: PollerHandle,
}

impl Workspaces {
    pub fn new(ctx: &BarContext) -> Result<Self> {
        let config = ctx.config();
        let state = Observable::new(CompositorState::default());
        let output = config.output.clone();
        let views = bind(&state, move |s: &CompositorState| project(s, output.as_deref()));
        let label = views.map(|v: &Vec<WorkspaceView>| render_views(v));

        let runner: SharedRunner = Arc::clone(ctx.runner());
        let niri = config.commands.niri.clone();
        let poller = Poll::every(millis(config.intervals.workspaces_ms))
            .name("workspaces")
            .spawn_into(
                ctx.runtime(),
                move |cx| {
                    let workspaces = query(runner.as_ref(), cx, &format!("{niri} msg -j workspaces"))?;
                    let windows = query(runner.as_ref(), cx, &format!("{niri} msg -j windows"))?;
                    Ok::<_, CompositorError>(CompositorState {
                        workspaces,
                        windows,
                    })
                },
                &state,
            )?;

        Ok(Self {
            ctx: ctx.clone(),
            state,
            views,
            label,
            _poller: poller,
        })
    }

    #[must_use]
    pub fn views(&self) -> &Binding<Vec<WorkspaceView>> {
        &self.views
    }

    /// Click action on workspace `idx`.
    pub fn focus(&self, idx: u32) -> TaskHandle {
        let niri = &self.ctx.config().commands.niri;
        self.run_actions("workspace-focus", vec![focus_command(niri, idx)])
    }

    /// Scroll action on workspace `idx`: focus it, then move one column
    /// right (`up`) or left.
    pub fn cycle(&self, idx: u32, up: bool) -> TaskHandle {
        let niri = &self.ctx.config().commands.niri;
        let direction = if up { "right" } else { "left" };
        self.run_actions(
            "workspace-cycle",
            vec![
                focus_command(niri, idx),
                format!("{niri} msg action focus-column-{direction}"),
            ],
        )
    }

    fn run_actions(&self, name: &str, commands: Vec<String>) -> TaskHandle {
        debug!(?commands, "workspace action");
        let runner: SharedRunner = Arc::clone(self.ctx.runner());
        self.ctx.runtime().launch(
            Task::new(move |cx| {
                for command in &commands {
                    runner.run(cx, command)?;
                }
                Ok::<_, statebar_runtime::ShellError>(())
            })
            .name(name),
        )
    }

    #[must_use]
    pub fn segment(&self) -> Segment {
        Segment::new("workspaces").label(self.label.clone())
    }
}

fn focus_command(niri: &str, idx: u32) -> String {
    format!("{niri} msg action focus-workspace {idx}")
}

#[cfg(test)]
mod tests {
    use super::*;

    const WORKSPACES: &str = r#"[
        {"id": 5, "idx": 2, "name": null, "output": "eDP-1", "is_urgent": false, "is_active": false, "is_focused": false, "active_window_id": null},
        {"id": 3, "idx": 1, "name": null, "output": "eDP-1", "is_urgent": false, "is_active": true, "is_focused": true, "active_window_id": 11},
        {"id": 7, "idx": 1, "name": null, "output": "HDMI-A-1", "is_urgent": false, "is_active": true, "is_focused": false, "active_window_id": null}
    ]"#;

    const WINDOWS: &str = r#"[
        {"id": 11, "title": "~", "app_id": "kitty", "pid": 100, "workspace_id": 3, "is_focused": true},
        {"id": 12, "title": "Mozilla", "app_id": "Firefox", "pid": 101, "workspace_id": 3, "is_focused": false},
        {"id": 13, "title": "notes", "app_id": "obsidian", "pid": 102, "workspace_id": 5, "is_focused": false}
    ]"#;

    fn state() -> CompositorState {
        CompositorState {
            workspaces: serde_json::from_str(WORKSPACES).expect("workspaces"),
            windows: serde_json::from_str(WINDOWS).expect("windows"),
        }
    }

    #[test]
    fn projection_filters_output_and_sorts() {
        let views = project(&state(), Some("eDP-1"));
        assert_eq!(views.iter().map(|v| v.idx).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(views[0].icons, vec!["kitty-custom", "firefox"]);
        assert_eq!(views[0].css_classes, vec!["hl-workspace", "hl-workspace-active"]);
        assert_eq!(views[1].icons, vec!["obsidian"]);
        assert_eq!(views[1].css_classes, vec!["hl-workspace"]);
    }

    #[test]
    fn empty_active_workspace_gets_logo() {
        let views = project(&state(), Some("HDMI-A-1"));
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].icons, vec![EMPTY_WORKSPACE_ICON]);
        // active but not focused
        assert_eq!(views[0].css_classes, vec!["hl-workspace"]);
    }

    #[test]
    fn empty_inactive_workspace_has_no_icons() {
        let mut s = state();
        s.windows.retain(|w| w.workspace_id != Some(5));
        let views = project(&s, Some("eDP-1"));
        assert!(views[1].icons.is_empty());
    }

    #[test]
    fn no_output_shows_everything() {
        assert_eq!(project(&state(), None).len(), 3);
    }

    #[test]
    fn app_icon_rules() {
        assert_eq!(app_icon("kitty"), "kitty-custom");
        assert_eq!(app_icon("org.gnome.Nautilus"), "org.gnome.nautilus");
        assert_eq!(app_icon("Kitty"), "kitty");
    }

    #[test]
    fn render_marks_highlighted() {
        let views = project(&state(), Some("eDP-1"));
        assert_eq!(render_views(&views), "1*:kitty-custom,firefox 2:obsidian");
    }
}
