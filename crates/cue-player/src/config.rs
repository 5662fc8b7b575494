/// Tuning parameters shared by the decode/resample/playback stages.
#[derive(Clone, Debug)]
pub struct PlaybackTuning {
    /// Decoder/resampler chunk size in frames.
    pub chunk_frames: usize,
    /// Max frames pulled per output callback refill.
    pub refill_max_frames: usize,
    /// Target buffer duration for queue sizing.
    pub buffer_seconds: f32,
}

impl Default for PlaybackTuning {
    /// Defaults tuned for small single-board hosts driving one output.
    fn default() -> Self {
        Self {
            chunk_frames: 1024,
            refill_max_frames: 4096,
            buffer_seconds: 2.0,
        }
    }
}
