use rand::RngExt;

/// Pre-recorded clips played in place of a live camera.
#[derive(Debug, Clone)]
pub struct FallbackClips {
    clips: Vec<String>,
}

impl FallbackClips {
    pub fn new(clips: Vec<String>) -> Self {
        Self { clips }
    }

    /// Pick a clip at random. Purely cosmetic.
    pub fn pick(&self) -> Option<String> {
        if self.clips.is_empty() {
            return None;
        }
        let idx = rand::rng().random_range(0..self.clips.len());
        Some(self.clips[idx].clone())
    }
}
