// [libs/domain-models/src/frame.rs]
/*!
 * APARATO: FRAME CONTRACT
 * CLASIFICACIÓN: DOMAIN MODELS (ESTRATO L2)
 * RESPONSABILIDAD: REPRESENTACIÓN INMUTABLE DE UN FOTOGRAMA DECODIFICADO
 */

use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A single decoded video frame, owned exclusively by whatever produced it.
///
/// `pixels` holds raw interleaved RGB bytes (`width * height * 3` long).
/// `Frame` is cheap to clone: the pixel buffer is `Arc`-shared, never copied
/// on clone. Nothing downstream of [`crate::event::Event`] is allowed to
/// mutate a `Frame` once constructed — only `FrameSource` produces them.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pixels: Arc<[u8]>,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>, captured_at: DateTime<Utc>) -> Self {
        Self {
            width,
            height,
            pixels: Arc::from(pixels),
            captured_at,
        }
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn center(&self) -> (f32, f32) {
        (self.width as f32 / 2.0, self.height as f32 / 2.0)
    }
}
