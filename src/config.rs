use directories::UserDirs;
use log::info;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::error::{Error, Result};
use crate::feedback::Tones;
use crate::frame::{CoordinateFrame, StaticScreen};
use crate::geometry::HitModel;
use crate::input::discover_pointers;
use crate::machine::EngineOptions;
use crate::pipeline::PipelineOptions;
use crate::tracker::TabletRanges;
use crate::trial::TrialOptions;

/// Physical origin of the task, in centimeters from the lower-left corner.
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct FrameSettings {
    pub origin_x_cm: f64,
    pub origin_y_cm: f64,
}

impl Default for FrameSettings {
    fn default() -> Self {
        Self {
            origin_x_cm: 5.0,
            origin_y_cm: 10.0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct TrialSettings {
    pub passing_offset_cm: f64,
    pub inter_trial_delay_ms: u64,
    pub start_index: usize,
    pub hit_model: HitModel,
    /// Obstacle rows carry `dx, dy` after the extent.
    pub rect_velocity: bool,
    /// 0 waits in Idle forever.
    pub arm_timeout_ms: u64,
}

impl Default for TrialSettings {
    fn default() -> Self {
        Self {
            passing_offset_cm: 1.0,
            inter_trial_delay_ms: 1500,
            start_index: 0,
            hit_model: HitModel::Ellipse,
            rect_velocity: true,
            arm_timeout_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub screen: StaticScreen,
    pub frame: FrameSettings,
    pub trial: TrialSettings,
    pub pipeline: PipelineOptions,
    pub tablet: TabletRanges,
    pub feedback: Tones,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            screen: StaticScreen {
                width_px: 1920,
                height_px: 1080,
                width_mm: 344.0,
                height_mm: 194.0,
            },
            frame: FrameSettings::default(),
            trial: TrialSettings::default(),
            pipeline: PipelineOptions::default(),
            tablet: TabletRanges::default(),
            feedback: Tones::default(),
        }
    }
}

pub fn config_dir() -> Result<PathBuf> {
    let home = UserDirs::new()
        .ok_or_else(|| Error::config("cannot locate the home directory"))?
        .home_dir()
        .to_path_buf();
    Ok(home.join(".config").join("tracetrial"))
}

pub fn default_settings_text() -> &'static str {
    include_str!("../defaults/settings.toml")
}

impl Settings {
    pub fn parse(txt: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(txt)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let txt = fs::read_to_string(path).map_err(|e| {
            Error::config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::parse(&txt)
    }

    /// Loads `~/.config/tracetrial/settings.toml`, writing the built-in
    /// defaults there first if it does not exist.
    pub fn load_or_install_default() -> Result<(Self, PathBuf)> {
        let dir = config_dir()?;
        fs::create_dir_all(&dir)?;
        let path = dir.join("settings.toml");
        if !path.exists() {
            fs::write(&path, default_settings_text())?;
            info!("installed default settings at {}", path.display());
        }
        Ok((Self::load(&path)?, path))
    }

    pub fn validate(&self) -> Result<()> {
        let s = &self.screen;
        if s.width_px == 0 || s.height_px == 0 {
            return Err(Error::config("screen resolution must be positive"));
        }
        if !(s.width_mm > 0.0 && s.height_mm > 0.0) {
            return Err(Error::config("screen physical size must be positive"));
        }
        if !(self.trial.passing_offset_cm.is_finite() && self.trial.passing_offset_cm >= 0.0) {
            return Err(Error::config("trial.passing_offset_cm must be non-negative"));
        }
        if self.trial.inter_trial_delay_ms == 0 {
            return Err(Error::config("trial.inter_trial_delay_ms must be positive"));
        }
        if self.pipeline.queue_capacity == 0 {
            return Err(Error::config("pipeline.queue_capacity must be positive"));
        }
        let t = &self.tablet;
        if t.x_max <= 0 || t.y_max <= 0 || t.pressure_max <= 0 {
            return Err(Error::config("tablet axis ranges must be positive"));
        }
        for tone in [self.feedback.start, self.feedback.success, self.feedback.failure] {
            if !(tone.frequency_hz > 0.0) || tone.duration_ms == 0 {
                return Err(Error::config("feedback tones need a frequency and a duration"));
            }
        }
        Ok(())
    }

    pub fn coordinate_frame(&self) -> Result<CoordinateFrame> {
        CoordinateFrame::new(
            &self.screen,
            (self.frame.origin_x_cm, self.frame.origin_y_cm),
        )
    }

    pub fn trial_options(&self) -> TrialOptions {
        TrialOptions {
            passing_offset_cm: self.trial.passing_offset_cm,
            hit_model: self.trial.hit_model,
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        let arm = self.trial.arm_timeout_ms;
        EngineOptions {
            pipeline: self.pipeline,
            tones: self.feedback,
            inter_trial_delay: Duration::from_millis(self.trial.inter_trial_delay_ms),
            arm_timeout: (arm > 0).then(|| Duration::from_millis(arm)),
        }
    }
}

pub fn doctor_report(settings_path: Option<&Path>) -> serde_json::Value {
    let devices: Vec<String> = discover_pointers()
        .iter()
        .map(|d| format!("{} [{:?}] ({})", d.name, d.kind, d.path))
        .collect();
    serde_json::json!({
        "input_group_member": check_in_input_group(),
        "settings": settings_path,
        "pointer_devices": devices,
        "hints": {
            "add_user_to_input_group": "sudo usermod -aG input $USER && newgrp input"
        }
    })
}

fn check_in_input_group() -> bool {
    let Ok(s) = fs::read_to_string("/etc/group") else {
        return false;
    };
    let user = whoami::username();
    s.lines()
        .filter(|line| line.starts_with("input:"))
        .any(|line| {
            line.split(':')
                .nth(3)
                .unwrap_or("")
                .split(',')
                .any(|u| u == user)
        })
}
