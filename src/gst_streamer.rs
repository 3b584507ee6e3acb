//! [`Streamer`] for a GStreamer video encoder element

use anyhow::{anyhow, Result};
use gst::prelude::*;
use gstreamer as gst;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::conditioner::Streamer;

static CAT: Lazy<gst::DebugCategory> = Lazy::new(|| {
    gst::DebugCategory::new(
        "streamconditioner",
        gst::DebugColorFlags::empty(),
        Some("Stream conditioner encoder adapter"),
    )
});

/// Candidate bitrate properties and the bps represented by one unit
const BITRATE_PROPERTIES: &[(&str, u32)] = &[
    ("bitrate", 1000),     // x264enc, x265enc, vp8enc... (kbps)
    ("target-bitrate", 1), // some HW encoders (bps)
    ("target_bitrate", 1),
    ("avg-bitrate", 1),
    ("avg_bitrate", 1),
];

/// Downscales at or beyond this ratio request a key unit
const KEYUNIT_DOWNSCALE_RATIO: f64 = 1.5;

#[derive(Debug, Clone, PartialEq)]
struct BitrateProperty {
    name: &'static str,
    bps_per_unit: u32,
    signed: bool,
}

impl BitrateProperty {
    fn detect(encoder: &gst::Element) -> Option<Self> {
        for &(name, bps_per_unit) in BITRATE_PROPERTIES {
            let Some(pspec) = encoder.find_property(name) else {
                continue;
            };
            let flags = pspec.flags();
            if !flags.contains(gst::glib::ParamFlags::WRITABLE)
                || flags.contains(gst::glib::ParamFlags::CONSTRUCT_ONLY)
            {
                continue;
            }
            let signed = if pspec.value_type() == u32::static_type() {
                false
            } else if pspec.value_type() == i32::static_type() {
                true
            } else {
                continue;
            };
            return Some(Self {
                name,
                bps_per_unit,
                signed,
            });
        }
        None
    }

    fn to_units(&self, bps: u32) -> u32 {
        (bps / self.bps_per_unit).max(1)
    }

    /// Value for a `gint` property, if it fits
    fn signed_units(&self, units: u32) -> Option<i32> {
        i32::try_from(units).ok()
    }
}

pub struct GstEncoderStreamer {
    encoder: gst::Element,
    property: BitrateProperty,
    keyunit_on_downscale: bool,
    last_bps: Mutex<Option<u32>>,
}

impl GstEncoderStreamer {
    /// Wrap an encoder. Fails if it exposes no writable integer bitrate property.
    pub fn new(encoder: gst::Element) -> Result<Self> {
        let property = BitrateProperty::detect(&encoder).ok_or_else(|| {
            anyhow!(
                "encoder '{}' has no writable bitrate property",
                encoder.name()
            )
        })?;
        gst::info!(
            CAT,
            "Detected encoder bitrate property '{}' ({} bps per unit)",
            property.name,
            property.bps_per_unit
        );
        Ok(Self {
            encoder,
            property,
            keyunit_on_downscale: true,
            last_bps: Mutex::new(None),
        })
    }

    pub fn with_keyunit_on_downscale(mut self, enabled: bool) -> Self {
        self.keyunit_on_downscale = enabled;
        self
    }

    pub fn property_name(&self) -> &'static str {
        self.property.name
    }

    /// Current encoder bitrate in bps
    pub fn encoder_bitrate(&self) -> u32 {
        let units = if self.property.signed {
            self.encoder.property::<i32>(self.property.name).max(0) as u32
        } else {
            self.encoder.property::<u32>(self.property.name)
        };
        units.saturating_mul(self.property.bps_per_unit)
    }

    fn force_keyframe(&self) {
        let event = gst::event::CustomDownstream::new(
            gst::Structure::builder("GstForceKeyUnit")
                .field("all-headers", true)
                .field("count", 1u32)
                .build(),
        );
        let sent = match self.encoder.static_pad("sink") {
            Some(pad) => pad.send_event(event),
            None => self.encoder.send_event(event),
        };
        if sent {
            gst::debug!(CAT, "Sent force-key-unit event to encoder");
        } else {
            gst::warning!(CAT, "Failed to send force-key-unit event to encoder");
        }
    }
}

impl Streamer for GstEncoderStreamer {
    fn set_bitrate(&self, bitrate_bps: u32) -> Result<()> {
        let mut last_bps = self.last_bps.lock();
        let previous = (*last_bps).unwrap_or_else(|| self.encoder_bitrate());
        let units = self.property.to_units(bitrate_bps);

        if self.property.signed {
            let value = self.property.signed_units(units).ok_or_else(|| {
                anyhow!("bitrate {} bps overflows '{}'", bitrate_bps, self.property.name)
            })?;
            self.encoder.set_property(self.property.name, value);
        } else {
            self.encoder.set_property(self.property.name, units);
        }
        *last_bps = Some(bitrate_bps);
        drop(last_bps);
        gst::debug!(
            CAT,
            "Set '{}' to {} ({} -> {} bps)",
            self.property.name,
            units,
            previous,
            bitrate_bps
        );

        if self.keyunit_on_downscale
            && bitrate_bps > 0
            && previous as f64 / bitrate_bps as f64 >= KEYUNIT_DOWNSCALE_RATIO
        {
            gst::info!(
                CAT,
                "Forcing keyframe after downscale {} -> {} bps",
                previous,
                bitrate_bps
            );
            self.force_keyframe();
        }
        Ok(())
    }

    fn set_frame_rate(&self, frame_rate: u32) -> Result<()> {
        // Frame rate lives in caps; renegotiation is left to the pipeline owner
        gst::debug!(
            CAT,
            "Advisory frame rate {} fps not applied to encoder",
            frame_rate
        );
        Ok(())
    }
}
