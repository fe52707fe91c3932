// Presentation surface for a terminal host: no native adaptive playback, nothing rendered.

use playgate_engine::{MediaSurface, PlayError};
use tracing::debug;

#[derive(Debug, Default)]
pub struct HeadlessSurface {
    source: Option<String>,
    playing: bool,
}

impl HeadlessSurface {
    pub fn source(&self) -> Option<&str> {
        self.source.as_deref()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }
}

impl MediaSurface for HeadlessSurface {
    fn can_play_type(&self, _mime: &str) -> bool {
        false
    }

    fn set_source(&mut self, url: &str) {
        debug!(url, "Surface bound");
        self.source = Some(url.to_string());
        self.playing = false;
    }

    fn clear_source(&mut self) {
        self.source = None;
        self.playing = false;
    }

    fn play(&mut self) -> Result<(), PlayError> {
        self.playing = true;
        Ok(())
    }
}
