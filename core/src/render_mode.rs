use serde::{Deserialize, Serialize};

pub const RENDER_MODE_KEY: &str = "crossbridge.render_mode";
pub const RENDER_MODE_QUERY_PARAM: &str = "render_mode";
pub const RENDER_MODE_COOKIE_MAX_AGE_SECS: u32 = 365 * 24 * 60 * 60;

/// How the legacy grid is drawn.
///
/// `Premium` applies the locked sizing stylesheet; `Classic` leaves the
/// engine's own table layout alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RenderMode {
    Classic,
    #[default]
    Premium,
}

impl RenderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            RenderMode::Classic => "classic",
            RenderMode::Premium => "premium",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if value.eq_ignore_ascii_case("classic") {
            Some(RenderMode::Classic)
        } else if value.eq_ignore_ascii_case("premium") {
            Some(RenderMode::Premium)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSource {
    Query,
    Storage,
    Cookie,
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedMode {
    pub mode: RenderMode,
    pub source: ModeSource,
}

impl ResolvedMode {
    /// A query override is one-shot and has to be written back.
    pub fn needs_persist(&self) -> bool {
        self.source == ModeSource::Query
    }
}

pub fn resolve_render_mode(
    query: Option<&str>,
    stored: Option<&str>,
    cookie_header: Option<&str>,
) -> ResolvedMode {
    if let Some(mode) = query.and_then(RenderMode::parse) {
        return ResolvedMode {
            mode,
            source: ModeSource::Query,
        };
    }
    if let Some(mode) = stored.and_then(RenderMode::parse) {
        return ResolvedMode {
            mode,
            source: ModeSource::Storage,
        };
    }
    if let Some(mode) = cookie_header.and_then(render_mode_from_cookies) {
        return ResolvedMode {
            mode,
            source: ModeSource::Cookie,
        };
    }
    ResolvedMode {
        mode: RenderMode::default(),
        source: ModeSource::Default,
    }
}

pub fn render_mode_cookie(mode: RenderMode) -> String {
    format!(
        "{RENDER_MODE_KEY}={}; Max-Age={RENDER_MODE_COOKIE_MAX_AGE_SECS}; Path=/; SameSite=Lax",
        mode.as_str()
    )
}

pub fn render_mode_from_cookies(header: &str) -> Option<RenderMode> {
    header.split(';').find_map(|chunk| {
        let mut iter = chunk.trim().splitn(2, '=');
        let key = iter.next().unwrap_or("").trim();
        let value = iter.next().unwrap_or("").trim();
        if key == RENDER_MODE_KEY {
            RenderMode::parse(value)
        } else {
            None
        }
    })
}
