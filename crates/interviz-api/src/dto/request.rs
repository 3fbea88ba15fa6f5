/// Raw query pairs, in the order they appear in the URL
pub type QueryPairs = Vec<(String, String)>;

/// First value of `name`; later repetitions are ignored
fn first(pairs: &[(String, String)], name: &str) -> Option<String> {
    pairs.iter().find(|(key, _)| key == name).map(|(_, value)| value.clone())
}

/// Query string of `GET /viewshed`.
///
/// Fields stay raw strings so that missing and malformed values are
/// reported by the validators with their own messages.
#[derive(Debug, Default)]
pub struct ViewshedQuery {
    pub coordinates: Option<String>,
    pub height1: Option<String>,
    pub height2: Option<String>,
    pub max_distance: Option<String>,
}

impl ViewshedQuery {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self {
            coordinates: first(pairs, "coordinates"),
            height1: first(pairs, "height1"),
            height2: first(pairs, "height2"),
            max_distance: first(pairs, "max_distance"),
        }
    }
}

/// Query string of `GET /sunmask`
#[derive(Debug, Default)]
pub struct SunmaskQuery {
    pub coordinates: Option<String>,
    pub year: Option<String>,
    pub month: Option<String>,
    pub day: Option<String>,
    pub hour: Option<String>,
    pub minute: Option<String>,
    pub max_distance: Option<String>,
    pub timezone: Option<String>,
}

impl SunmaskQuery {
    pub fn from_pairs(pairs: &[(String, String)]) -> Self {
        Self {
            coordinates: first(pairs, "coordinates"),
            year: first(pairs, "year"),
            month: first(pairs, "month"),
            day: first(pairs, "day"),
            hour: first(pairs, "hour"),
            minute: first(pairs, "minute"),
            max_distance: first(pairs, "max_distance"),
            timezone: first(pairs, "timezone"),
        }
    }
}
