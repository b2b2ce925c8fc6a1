//! EMU-2 serial protocol: XML fragment accumulation and field decoding.
//!
//! The device streams standalone XML fragments over the serial link, one
//! element per notification, all numeric fields hex-encoded:
//!
//! ```text
//! <InstantaneousDemand>
//!   <TimeStamp>0x2f3e09a1</TimeStamp>
//!   <Demand>0x0003e8</Demand>
//!   <Multiplier>0x00000001</Multiplier>
//!   <Divisor>0x000003e8</Divisor>
//! </InstantaneousDemand>
//! ```
//!
//! Anything garbled, incomplete or missing a required field is dropped
//! silently; the device resends on its own schedule.

use log::debug;

use crate::readings::{Reading, ReadingKind, Scale};

const FRAGMENT_TAGS: [(&str, &str, ReadingKind); 3] = [
    (
        "<InstantaneousDemand>",
        "</InstantaneousDemand>",
        ReadingKind::Demand,
    ),
    (
        "<CurrentSummationDelivered>",
        "</CurrentSummationDelivered>",
        ReadingKind::Summation,
    ),
    ("<PriceCluster>", "</PriceCluster>", ReadingKind::Price),
];

// Upper bound on buffered unparsed text; real fragments are a few hundred
// bytes, so anything larger has lost its close tag to line noise.
const MAX_BUFFER: usize = 16 * 1024;
// Tail kept when discarding junk, in case a tag is split across reads.
const TAIL_KEEP: usize = 64;

/// Accumulates raw serial text and yields decoded readings as complete
/// fragments arrive. Fragments may be split across arbitrarily many reads.
#[derive(Debug, Default)]
pub struct FragmentBuffer {
    buffer: String,
}

impl FragmentBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk of serial text, returning every reading completed by
    /// it, in arrival order.
    pub fn feed(&mut self, chunk: &str) -> Vec<Reading> {
        self.buffer.push_str(chunk);
        let mut readings = Vec::new();

        // Take complete fragments as long as any are present. Draining
        // through a fragment also discards any earlier open tag whose close
        // was lost to line noise; the device never nests or interleaves
        // notifications, so text before a complete fragment is junk.
        while let Some((body_start, body_end, fragment_end, kind)) =
            self.earliest_complete_fragment()
        {
            let body = &self.buffer[body_start..body_end];
            if let Some(reading) = parse_fragment(kind, body) {
                readings.push(reading);
            } else {
                debug!("Dropping malformed {} fragment", kind);
            }
            self.buffer.drain(..fragment_end);
        }

        self.discard_stalled();
        readings
    }

    fn earliest_complete_fragment(
        &self,
    ) -> Option<(usize, usize, usize, ReadingKind)> {
        FRAGMENT_TAGS
            .iter()
            .filter_map(|&(open, close, kind)| {
                let start = self.buffer.find(open)?;
                let body_start = start + open.len();
                let body_end = self.buffer[body_start..].find(close)? + body_start;
                Some((body_start, body_end, body_end + close.len(), kind))
            })
            .min_by_key(|&(body_start, ..)| body_start)
    }

    fn earliest_open_tag(&self) -> Option<usize> {
        FRAGMENT_TAGS
            .iter()
            .filter_map(|&(open, ..)| self.buffer.find(open))
            .min()
    }

    /// Drop buffered text that can no longer become a reading: junk ahead of
    /// a pending open tag, and any pending fragment that has outgrown every
    /// real notification (its close tag is not coming).
    fn discard_stalled(&mut self) {
        if let Some(start) = self.earliest_open_tag() {
            // A found tag always starts at a char boundary.
            self.buffer.drain(..start);
        }
        if self.buffer.len() > MAX_BUFFER {
            self.truncate_to_tail();
        }
    }

    fn truncate_to_tail(&mut self) {
        let mut keep = self.buffer.len().saturating_sub(TAIL_KEEP);
        // Serial garbage decodes to multi-byte replacement chars; never cut
        // one in half.
        while keep > 0 && !self.buffer.is_char_boundary(keep) {
            keep -= 1;
        }
        self.buffer.drain(..keep);
    }
}

/// Decode one fragment body. Returns `None` when any required field is
/// absent or unparsable.
pub fn parse_fragment(kind: ReadingKind, body: &str) -> Option<Reading> {
    let timestamp = u32::try_from(hex_field(body, "TimeStamp")?).ok()?;

    let (raw_value, scale) = match kind {
        ReadingKind::Demand => (
            hex_field(body, "Demand")?,
            Scale::Ratio {
                multiplier: hex_field(body, "Multiplier")?,
                divisor: hex_field(body, "Divisor")?,
            },
        ),
        ReadingKind::Summation => (
            hex_field(body, "SummationDelivered")?,
            Scale::Ratio {
                multiplier: hex_field(body, "Multiplier")?,
                divisor: hex_field(body, "Divisor")?,
            },
        ),
        ReadingKind::Price => (
            hex_field(body, "Price")?,
            Scale::TrailingDigits(u32::try_from(hex_field(body, "TrailingDigits")?).ok()?),
        ),
    };

    Some(Reading {
        kind,
        raw_value,
        scale,
        timestamp,
    })
}

/// Extract `<tag>0x…</tag>` from a fragment body as an integer.
fn hex_field(body: &str, tag: &str) -> Option<u64> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let start = body.find(&open)? + open.len();
    let end = body[start..].find(&close)? + start;
    let text = body[start..end].trim();
    let digits = text
        .strip_prefix("0x")
        .or_else(|| text.strip_prefix("0X"))
        .unwrap_or(text);
    u64::from_str_radix(digits, 16).ok()
}

/// The EMU command envelope. `refresh` asks the meter for a fresh value
/// instead of the device cache.
pub fn command(name: &str, refresh: Option<bool>) -> String {
    match refresh {
        Some(flag) => format!(
            "<Command><Name>{}</Name><Refresh>{}</Refresh></Command>\n",
            name,
            if flag { "Y" } else { "N" }
        ),
        None => format!("<Command><Name>{}</Name></Command>\n", name),
    }
}
