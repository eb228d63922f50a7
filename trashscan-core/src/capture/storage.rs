/// Bytes per accounting unit. Files are counted in whole megabytes.
const MIB: u64 = 1024 * 1024;

/// Running storage indicator for captured files.
///
/// Purely informational: values past the capacity are clamped, writes are
/// never refused.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StorageGauge {
    used_mb: u64,
    max_capacity_mb: u64,
}

impl StorageGauge {
    pub fn new(max_capacity_mb: u64) -> Self {
        Self {
            used_mb: 0,
            max_capacity_mb,
        }
    }

    /// Account for a written file of `bytes` bytes (floored to whole MB).
    pub fn record_bytes(&mut self, bytes: u64) {
        let size_mb = bytes / MIB;
        self.used_mb = self
            .used_mb
            .saturating_add(size_mb)
            .min(self.max_capacity_mb);
    }

    pub fn used_mb(&self) -> u64 {
        self.used_mb
    }

    pub fn max_capacity_mb(&self) -> u64 {
        self.max_capacity_mb
    }

    pub fn fraction(&self) -> f64 {
        if self.max_capacity_mb == 0 {
            0.0
        } else {
            self.used_mb as f64 / self.max_capacity_mb as f64
        }
    }

    /// `[#####-----] 50%` with `width` cells.
    pub fn render_bar(&self, width: usize) -> String {
        let fraction = self.fraction();
        let filled = ((width as f64) * fraction) as usize;
        let empty = width.saturating_sub(filled);
        format!(
            "[{}{}] {}%",
            "#".repeat(filled),
            "-".repeat(empty),
            (fraction * 100.0) as u32
        )
    }

    /// The three indicator lines shown under the status log.
    pub fn summary_lines(&self, bar_width: usize) -> [String; 3] {
        [
            format!("Used Space: {} mb", self.used_mb),
            format!("Maximum Capacity: {} mb", self.max_capacity_mb),
            self.render_bar(bar_width),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_whole_megabytes() {
        let mut gauge = StorageGauge::new(100);
        gauge.record_bytes(MIB - 1);
        assert_eq!(gauge.used_mb(), 0);
        gauge.record_bytes(3 * MIB + 12);
        assert_eq!(gauge.used_mb(), 3);
    }

    #[test]
    fn clamps_at_capacity() {
        let mut gauge = StorageGauge::new(10);
        for _ in 0..7 {
            gauge.record_bytes(4 * MIB);
        }
        assert_eq!(gauge.used_mb(), 10);
        gauge.record_bytes(u64::MAX);
        assert_eq!(gauge.used_mb(), 10);
        assert_eq!(gauge.render_bar(4), "[####] 100%");
    }

    #[test]
    fn zero_capacity_renders_empty() {
        let mut gauge = StorageGauge::new(0);
        gauge.record_bytes(5 * MIB);
        assert_eq!(gauge.used_mb(), 0);
        assert_eq!(gauge.render_bar(3), "[---] 0%");
    }

    #[test]
    fn summary_matches_operator_display() {
        let mut gauge = StorageGauge::new(2048);
        gauge.record_bytes(1024 * MIB);
        let lines = gauge.summary_lines(30);
        assert_eq!(lines[0], "Used Space: 1024 mb");
        assert_eq!(lines[1], "Maximum Capacity: 2048 mb");
        assert_eq!(lines[2], format!("[{}{}] 50%", "#".repeat(15), "-".repeat(15)));
    }
}
