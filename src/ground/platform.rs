//! Platform strategy: the only per-OS divergence is the command modifier
//! (select-all / paste chords) and the launcher recipe behind
//! `Open` / `SwitchApplications`.

use crate::config::Platform;
use crate::input::Primitive;

const LAUNCHER_OPEN_DELAY: f32 = 0.5;
const APP_LAUNCH_DELAY: f32 = 1.0;

pub trait PlatformStrategy: Send + Sync {
    fn name(&self) -> &'static str;

    /// The chord that selects all text in a focused field.
    fn select_all_keys(&self) -> Vec<String>;

    /// The chord that pastes the clipboard.
    fn paste_keys(&self) -> Vec<String>;

    /// Opens an application or file through the OS launcher.
    fn open_sequence(&self, target: &str) -> Vec<Primitive>;

    /// Brings an application to the foreground. Defaults to the launcher
    /// recipe, which re-activates an already-running app on all three
    /// desktops.
    fn switch_sequence(&self, app: &str) -> Vec<Primitive> {
        self.open_sequence(app)
    }
}

fn launcher_recipe(launch_keys: Vec<String>, target: &str) -> Vec<Primitive> {
    vec![
        Primitive::Hotkey { keys: launch_keys },
        Primitive::Sleep {
            seconds: LAUNCHER_OPEN_DELAY,
        },
        Primitive::TypeText {
            text: target.to_string(),
        },
        Primitive::PressEnter,
        Primitive::Sleep {
            seconds: APP_LAUNCH_DELAY,
        },
    ]
}

pub struct Darwin;

impl PlatformStrategy for Darwin {
    fn name(&self) -> &'static str {
        "darwin"
    }

    fn select_all_keys(&self) -> Vec<String> {
        vec!["cmd".into(), "a".into()]
    }

    fn paste_keys(&self) -> Vec<String> {
        vec!["cmd".into(), "v".into()]
    }

    fn open_sequence(&self, target: &str) -> Vec<Primitive> {
        // Spotlight.
        launcher_recipe(vec!["cmd".into(), "space".into()], target)
    }
}

pub struct LinuxDesktop;

impl PlatformStrategy for LinuxDesktop {
    fn name(&self) -> &'static str {
        "linux"
    }

    fn select_all_keys(&self) -> Vec<String> {
        vec!["ctrl".into(), "a".into()]
    }

    fn paste_keys(&self) -> Vec<String> {
        vec!["ctrl".into(), "v".into()]
    }

    fn open_sequence(&self, target: &str) -> Vec<Primitive> {
        // GNOME activities search; KDE's launcher answers the same key.
        launcher_recipe(vec!["super".into()], target)
    }
}

pub struct WindowsDesktop;

impl PlatformStrategy for WindowsDesktop {
    fn name(&self) -> &'static str {
        "windows"
    }

    fn select_all_keys(&self) -> Vec<String> {
        vec!["ctrl".into(), "a".into()]
    }

    fn paste_keys(&self) -> Vec<String> {
        vec!["ctrl".into(), "v".into()]
    }

    fn open_sequence(&self, target: &str) -> Vec<Primitive> {
        // Start menu search.
        launcher_recipe(vec!["win".into()], target)
    }
}

pub fn strategy_for(platform: Platform) -> Box<dyn PlatformStrategy> {
    match platform {
        Platform::Darwin => Box::new(Darwin),
        Platform::Linux => Box::new(LinuxDesktop),
        Platform::Windows => Box::new(WindowsDesktop),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn darwin_open_recipe() {
        let primitives = Darwin.open_sequence("Safari");
        assert_eq!(
            primitives[0],
            Primitive::Hotkey {
                keys: vec!["cmd".into(), "space".into()]
            }
        );
        assert!(matches!(primitives[2], Primitive::TypeText { ref text } if text == "Safari"));
        assert_eq!(primitives[3], Primitive::PressEnter);
    }

    #[test]
    fn select_all_modifier_differs_by_platform() {
        assert_eq!(Darwin.select_all_keys()[0], "cmd");
        assert_eq!(LinuxDesktop.select_all_keys()[0], "ctrl");
        assert_eq!(WindowsDesktop.select_all_keys()[0], "ctrl");
    }
}
