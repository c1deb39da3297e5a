//! Audio filters applied by the node. Only value ranges are checked here,
//! their effect is up to the node.

use std::collections::HashSet;

use serde::Serialize;

use crate::error::{Error, Result};

pub const EQUALIZER_BANDS: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EqualizerBand {
    /// Band index, `0..=14`.
    pub band: u8,
    /// Gain multiplier, `-0.25..=1.0`.
    pub gain: f64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Karaoke {
    pub level: f64,
    pub mono_level: f64,
    pub filter_band: f64,
    pub filter_width: f64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Timescale {
    pub speed: f64,
    pub pitch: f64,
    pub rate: f64
}

impl Default for Timescale {
    fn default() -> Self {
        Self {
            speed: 1.0,
            pitch: 1.0,
            rate: 1.0
        }
    }
}

/// Shared shape of the tremolo and vibrato filters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Oscillation {
    pub frequency: f64,
    pub depth: f64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rotation {
    pub rotation_hz: f64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Distortion {
    pub sin_offset: f64,
    pub sin_scale: f64,
    pub cos_offset: f64,
    pub cos_scale: f64,
    pub tan_offset: f64,
    pub tan_scale: f64,
    pub offset: f64,
    pub scale: f64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelMix {
    pub left_to_left: f64,
    pub left_to_right: f64,
    pub right_to_left: f64,
    pub right_to_right: f64
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LowPass {
    pub smoothing: f64
}

/// Set of filters of a player. Volume lives on the player itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Filters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equalizer: Option<Vec<EqualizerBand>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub karaoke: Option<Karaoke>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timescale: Option<Timescale>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tremolo: Option<Oscillation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vibrato: Option<Oscillation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rotation: Option<Rotation>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distortion: Option<Distortion>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_mix: Option<ChannelMix>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub low_pass: Option<LowPass>
}

impl Filters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn equalizer(mut self, bands: Vec<EqualizerBand>) -> Result<Self> {
        validate_equalizer(&bands)?;
        self.equalizer = Some(bands);
        Ok(self)
    }

    pub fn karaoke(mut self, karaoke: Karaoke) -> Self {
        self.karaoke = Some(karaoke);
        self
    }

    pub fn timescale(mut self, timescale: Timescale) -> Result<Self> {
        validate_timescale(&timescale)?;
        self.timescale = Some(timescale);
        Ok(self)
    }

    pub fn tremolo(mut self, tremolo: Oscillation) -> Result<Self> {
        validate_tremolo(&tremolo)?;
        self.tremolo = Some(tremolo);
        Ok(self)
    }

    pub fn vibrato(mut self, vibrato: Oscillation) -> Result<Self> {
        validate_vibrato(&vibrato)?;
        self.vibrato = Some(vibrato);
        Ok(self)
    }

    pub fn rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = Some(rotation);
        self
    }

    pub fn distortion(mut self, distortion: Distortion) -> Self {
        self.distortion = Some(distortion);
        self
    }

    pub fn channel_mix(mut self, channel_mix: ChannelMix) -> Self {
        self.channel_mix = Some(channel_mix);
        self
    }

    pub fn low_pass(mut self, low_pass: LowPass) -> Self {
        self.low_pass = Some(low_pass);
        self
    }

    /// Checks every set filter. Fields can be assigned directly, so this runs
    /// again before filters are sent.
    pub fn validate(&self) -> Result<()> {
        if let Some(bands) = &self.equalizer {
            validate_equalizer(bands)?;
        }
        if let Some(timescale) = &self.timescale {
            validate_timescale(timescale)?;
        }
        if let Some(tremolo) = &self.tremolo {
            validate_tremolo(tremolo)?;
        }
        if let Some(vibrato) = &self.vibrato {
            validate_vibrato(vibrato)?;
        }

        Ok(())
    }
}

fn validate_equalizer(bands: &[EqualizerBand]) -> Result<()> {
    if bands.len() != EQUALIZER_BANDS {
        return Err(Error::validation(format!("equalizer must have {EQUALIZER_BANDS} bands, got {}", bands.len())));
    }
    if bands.iter().any(|b| b.band as usize >= EQUALIZER_BANDS) {
        return Err(Error::validation("equalizer band must be between 0 and 14"));
    }
    if bands.iter().any(|b| !(-0.25..=1.0).contains(&b.gain)) {
        return Err(Error::validation("equalizer gain must be between -0.25 and 1"));
    }
    if bands.iter().map(|b| b.band).collect::<HashSet<_>>().len() != bands.len() {
        return Err(Error::validation("a band cannot have more than one gain"));
    }

    Ok(())
}

fn validate_timescale(timescale: &Timescale) -> Result<()> {
    if [timescale.speed, timescale.pitch, timescale.rate].iter().any(|v| *v < 0.0) {
        return Err(Error::validation("timescale values must be greater than or equal to 0"));
    }

    Ok(())
}

fn validate_depth(name: &str, depth: f64) -> Result<()> {
    if depth <= 0.0 || depth > 1.0 {
        return Err(Error::validation(format!("{name} depth must be greater than 0 and at most 1")));
    }

    Ok(())
}

fn validate_tremolo(tremolo: &Oscillation) -> Result<()> {
    if tremolo.frequency <= 0.0 {
        return Err(Error::validation("tremolo frequency must be greater than 0"));
    }

    validate_depth("tremolo", tremolo.depth)
}

fn validate_vibrato(vibrato: &Oscillation) -> Result<()> {
    if vibrato.frequency <= 0.0 || vibrato.frequency > 14.0 {
        return Err(Error::validation("vibrato frequency must be greater than 0 and at most 14"));
    }

    validate_depth("vibrato", vibrato.depth)
}
