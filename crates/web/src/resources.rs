use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use miniprof_core::ids::RequestId;

pub const SCRIPT: &str = "mini_profiler.js";
pub const STYLESHEET: &str = "mini_profiler.css";
pub const INCLUDES: &str = "mini_profiler.html";

const ASSETS: &[(&str, &str)] = &[
    (SCRIPT, include_str!("../assets/mini_profiler.js")),
    (STYLESHEET, include_str!("../assets/mini_profiler.css")),
    (INCLUDES, include_str!("../assets/mini_profiler.html")),
];

const REQUEST_ID_PLACEHOLDER: &str = "@@requestId@@";

struct Asset {
    raw: &'static str,
    rendered: OnceLock<Arc<str>>,
}

/// Embedded UI assets with their placeholders filled in.
///
/// Each asset is rendered on first use and shared afterwards. Concurrent
/// first requests for the same name render it once.
pub struct ResourceLoader {
    assets: HashMap<&'static str, Asset>,
    replacements: Vec<(&'static str, String)>,
}

impl ResourceLoader {
    pub fn new(base_url: &str, html_id_prefix: &str) -> Self {
        let assets = ASSETS
            .iter()
            .map(|&(name, raw)| {
                (
                    name,
                    Asset {
                        raw,
                        rendered: OnceLock::new(),
                    },
                )
            })
            .collect();
        Self {
            assets,
            replacements: vec![
                ("@@baseURL@@", base_url.to_string()),
                ("@@prefix@@", html_id_prefix.to_string()),
            ],
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<str>> {
        let asset = self.assets.get(name)?;
        let rendered = asset.rendered.get_or_init(|| {
            let mut text = asset.raw.to_string();
            for (placeholder, value) in &self.replacements {
                text = text.replace(placeholder, value);
            }
            Arc::from(text)
        });
        Some(Arc::clone(rendered))
    }

    /// The `<head>` snippet that loads the widget for `request_id`.
    pub fn includes(&self, request_id: &RequestId) -> Option<String> {
        self.get(INCLUDES)
            .map(|html| html.replace(REQUEST_ID_PLACEHOLDER, request_id.as_str()))
    }
}

pub fn content_type_for(name: &str) -> &'static str {
    match name.rsplit_once('.').map(|(_, ext)| ext) {
        Some("js") => "text/javascript",
        Some("css") => "text/css",
        Some("html") => "text/html",
        _ => "text/plain",
    }
}
