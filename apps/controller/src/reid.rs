// [apps/controller/src/reid.rs]
/*!
 * APARATO: APPEARANCE RE-IDENTIFICATION
 * CLASIFICACIÓN: APPLICATION SERVICES (ESTRATO L4)
 * RESPONSABILIDAD: FINGERPRINTING POR HISTOGRAMA HUE/SATURATION Y
 *                   ASIGNACIÓN ESTABLE DE IDENTIDADES PERMANENTES
 *
 * Owned exclusively by `DetectionModule` and only ever touched from its
 * own processing call stack (spec.md §5's "Shared resources" table) — no
 * locking is needed here because nothing else reaches in.
 */

use std::collections::HashMap;

use aegis_domain_models::{BoundingBox, Frame, ReIdentity};
use chrono::{DateTime, Utc};

/// Bins per HS dimension; the flattened fingerprint is `HIST_BINS^2` long.
pub const HIST_BINS: usize = 16;

/// Converts one RGB triple into (hue degrees 0..360, saturation 0..1).
fn rgb_to_hs(r: u8, g: u8, b: u8) -> (f32, f32) {
    let (r, g, b) = (r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let hue = if delta.abs() < f32::EPSILON {
        0.0
    } else if max == r {
        60.0 * (((g - b) / delta).rem_euclid(6.0))
    } else if max == g {
        60.0 * (((b - r) / delta) + 2.0)
    } else {
        60.0 * (((r - g) / delta) + 4.0)
    };

    let saturation = if max.abs() < f32::EPSILON { 0.0 } else { delta / max };
    (hue.rem_euclid(360.0), saturation)
}

/// Computes a normalized 16x16 Hue/Saturation histogram (flattened
/// row-major, 256 bins) over the crop of `frame` described by `bbox`.
/// Returns `None` for a zero-area crop — the caller must skip that
/// detection rather than fingerprint a degenerate box.
pub fn appearance_fingerprint(frame: &Frame, bbox: &BoundingBox) -> Option<Vec<f32>> {
    let clamped = bbox.clamp_to_frame(frame.width, frame.height)?;
    let mut histogram = vec![0f32; HIST_BINS * HIST_BINS];
    let mut sampled = 0usize;

    let pixels = frame.pixels();
    let stride = frame.width as usize * 3;

    for y in clamped.y1..clamped.y2 {
        let row = y as usize * stride;
        for x in clamped.x1..clamped.x2 {
            let offset = row + x as usize * 3;
            let Some(&r) = pixels.get(offset) else { continue };
            let Some(&g) = pixels.get(offset + 1) else { continue };
            let Some(&b) = pixels.get(offset + 2) else { continue };

            let (hue, sat) = rgb_to_hs(r, g, b);
            let hue_bin = ((hue / 360.0) * HIST_BINS as f32) as usize;
            let sat_bin = (sat * HIST_BINS as f32) as usize;
            let hue_bin = hue_bin.min(HIST_BINS - 1);
            let sat_bin = sat_bin.min(HIST_BINS - 1);

            histogram[hue_bin * HIST_BINS + sat_bin] += 1.0;
            sampled += 1;
        }
    }

    if sampled == 0 {
        return None;
    }

    for bin in &mut histogram {
        *bin /= sampled as f32;
    }
    Some(histogram)
}

/// Pearson correlation between two equal-length histograms — the same
/// comparison OpenCV's `HISTCMP_CORREL` performs, returning values in
/// `[-1, 1]` where higher means more similar.
pub fn correlate(a: &[f32], b: &[f32]) -> f32 {
    debug_assert_eq!(a.len(), b.len());
    let n = a.len() as f32;
    if n == 0.0 {
        return 0.0;
    }
    let mean_a = a.iter().sum::<f32>() / n;
    let mean_b = b.iter().sum::<f32>() / n;

    let mut cov = 0f32;
    let mut var_a = 0f32;
    let mut var_b = 0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        let da = x - mean_a;
        let db = y - mean_b;
        cov += da * db;
        var_a += da * da;
        var_b += db * db;
    }

    let denom = (var_a * var_b).sqrt();
    if denom.abs() < f32::EPSILON {
        0.0
    } else {
        cov / denom
    }
}

/// Owns the `permanent_id -> ReIdentity` table and the volatile
/// `tracker_id -> permanent_id` map. All mutation happens inline in
/// `DetectionModule::process`'s call stack — see spec.md §5.
pub struct ReidTable {
    identities: HashMap<u64, ReIdentity>,
    tracker_to_permanent: HashMap<u64, u64>,
    next_permanent_id: u64,
    similarity_threshold: f32,
}

impl ReidTable {
    pub fn new(similarity_threshold: f32) -> Self {
        Self {
            identities: HashMap::new(),
            tracker_to_permanent: HashMap::new(),
            next_permanent_id: 1,
            similarity_threshold,
        }
    }

    /// Resolves one tracker id seen this frame to a stable permanent id,
    /// following the §4.6 re-identification algorithm: reuse an existing
    /// mapping, rebind to a free permanent id on a strong correlation
    /// match, or allocate a new permanent id.
    pub fn resolve(&mut self, tracker_id: u64, fingerprint: Vec<f32>, now: DateTime<Utc>) -> u64 {
        if let Some(&permanent_id) = self.tracker_to_permanent.get(&tracker_id) {
            if let Some(identity) = self.identities.get_mut(&permanent_id) {
                identity.update_fingerprint(fingerprint, now);
            }
            return permanent_id;
        }

        let active: std::collections::HashSet<u64> =
            self.tracker_to_permanent.values().copied().collect();

        let best_match = self
            .identities
            .values()
            .filter(|identity| !active.contains(&identity.permanent_id))
            .map(|identity| (identity.permanent_id, correlate(&identity.fingerprint, &fingerprint)))
            .fold(None, |best: Option<(u64, f32)>, candidate| match best {
                Some(b) if b.1 >= candidate.1 => Some(b),
                _ => Some(candidate),
            });

        let permanent_id = match best_match {
            Some((permanent_id, score)) if score > self.similarity_threshold => {
                if let Some(identity) = self.identities.get_mut(&permanent_id) {
                    identity.update_fingerprint(fingerprint, now);
                }
                permanent_id
            }
            _ => {
                let permanent_id = self.next_permanent_id;
                self.next_permanent_id += 1;
                self.identities
                    .insert(permanent_id, ReIdentity::new(permanent_id, fingerprint, now));
                permanent_id
            }
        };

        self.tracker_to_permanent.insert(tracker_id, permanent_id);
        permanent_id
    }

    /// Evicts tracker-id mappings for tracker ids not present in
    /// `seen_tracker_ids` — run once at the end of each frame.
    pub fn evict_stale_trackers(&mut self, seen_tracker_ids: &std::collections::HashSet<u64>) {
        self.tracker_to_permanent
            .retain(|tracker_id, _| seen_tracker_ids.contains(tracker_id));
    }

    pub fn display_name(&self, permanent_id: u64) -> String {
        self.identities
            .get(&permanent_id)
            .map(|identity| identity.display_name.clone())
            .unwrap_or_else(|| format!("Person {permanent_id}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn solid_frame(width: u32, height: u32, rgb: (u8, u8, u8)) -> Frame {
        let mut pixels = Vec::with_capacity((width * height * 3) as usize);
        for _ in 0..(width * height) {
            pixels.push(rgb.0);
            pixels.push(rgb.1);
            pixels.push(rgb.2);
        }
        Frame::new(width, height, pixels, Utc::now())
    }

    #[test]
    fn identical_crops_correlate_to_one() {
        let frame = solid_frame(32, 32, (200, 50, 50));
        let bbox = BoundingBox { x1: 0, y1: 0, x2: 16, y2: 16 };
        let a = appearance_fingerprint(&frame, &bbox).unwrap();
        let b = appearance_fingerprint(&frame, &bbox).unwrap();
        assert!((correlate(&a, &b) - 1.0).abs() < 1e-4);
    }

    #[test]
    fn zero_area_crop_is_skipped() {
        let frame = solid_frame(32, 32, (0, 0, 0));
        let bbox = BoundingBox { x1: 10, y1: 10, x2: 10, y2: 20 };
        assert!(appearance_fingerprint(&frame, &bbox).is_none());
    }

    #[test]
    fn continuously_visible_subject_keeps_its_permanent_id() {
        let frame = solid_frame(64, 64, (10, 200, 30));
        let bbox = BoundingBox { x1: 0, y1: 0, x2: 32, y2: 32 };
        let mut table = ReidTable::new(0.75);

        let fp1 = appearance_fingerprint(&frame, &bbox).unwrap();
        let first = table.resolve(7, fp1, Utc::now());
        table.evict_stale_trackers(&[7].into_iter().collect());

        let fp2 = appearance_fingerprint(&frame, &bbox).unwrap();
        let second = table.resolve(7, fp2, Utc::now());

        assert_eq!(first, second);
    }

    #[test]
    fn re_entry_recovers_permanent_id_above_threshold() {
        let frame = solid_frame(64, 64, (10, 200, 30));
        let bbox = BoundingBox { x1: 0, y1: 0, x2: 32, y2: 32 };
        let mut table = ReidTable::new(0.75);

        let fp1 = appearance_fingerprint(&frame, &bbox).unwrap();
        let permanent_id = table.resolve(7, fp1, Utc::now());
        // Subject leaves: its tracker id is no longer seen this frame.
        table.evict_stale_trackers(&std::collections::HashSet::new());

        // Re-enters under a brand new tracker id with the same appearance.
        let fp2 = appearance_fingerprint(&frame, &bbox).unwrap();
        let rebound = table.resolve(99, fp2, Utc::now());

        assert_eq!(permanent_id, rebound);
    }

    #[test]
    fn dissimilar_re_entry_allocates_new_identity() {
        let frame_a = solid_frame(64, 64, (250, 10, 10));
        let frame_b = solid_frame(64, 64, (10, 10, 250));
        let bbox = BoundingBox { x1: 0, y1: 0, x2: 32, y2: 32 };
        let mut table = ReidTable::new(0.75);

        let fp1 = appearance_fingerprint(&frame_a, &bbox).unwrap();
        let first = table.resolve(7, fp1, Utc::now());
        table.evict_stale_trackers(&std::collections::HashSet::new());

        let fp2 = appearance_fingerprint(&frame_b, &bbox).unwrap();
        let second = table.resolve(99, fp2, Utc::now());

        assert_ne!(first, second);
    }
}
