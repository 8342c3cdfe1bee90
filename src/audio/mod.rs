pub mod backend;
pub mod capture;
pub mod decode;
pub mod encoder;
pub mod file;
pub mod gain;
pub mod output;
pub mod playback;
pub mod resample;
pub mod timeline;

#[cfg(feature = "device")]
pub mod device;

pub use backend::{
    AudioBackend, AudioBackendConfig, AudioBackendFactory, AudioSource, CaptureBlock,
    ChannelBackend,
};
pub use capture::AudioCaptureEngine;
pub use decode::{DecodedAudio, PayloadDecoder, ReplyDecoder, ReplyFormat};
pub use encoder::{AudioFrame, FrameEncoder};
pub use file::{AudioFile, FileBackend};
pub use gain::{GainConfig, GainController, GainParam, GainRamp};
pub use output::{create_output, AudioOutput, AudioSink, NullOutput};
pub use playback::{PlaybackEngine, PlaybackQueueEntry, PlaybackSignal, PlaybackStats};
pub use resample::{resample, resample_to_target, TARGET_SAMPLE_RATE};
pub use timeline::{CancellationToken, PlaybackTimeline, RenderEvent};
