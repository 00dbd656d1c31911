//! Reading-portal engine: viewport sizing for paged documents, scroll progress
//! for the fullscreen reader, like/view counters and per-device reading
//! position, tied together by [`session::ReadingSession`].

pub mod catalog;
pub mod config;
pub mod counter;
pub mod document;
pub mod engagement;
pub mod pagination;
pub mod position;
pub mod progress;
pub mod session;
pub mod store;
pub mod text_utils;
pub mod viewport;

use std::fs;
use std::path::Path;
use ts_rs::TS;

fn export_single_type<T: TS + 'static>(out_dir: &Path) -> Result<(), String> {
    T::export_all_to(out_dir).map_err(|err| err.to_string())
}

/// Regenerate the TypeScript types shared with the web front end.
pub fn export_ts_bindings(out_dir: &Path) -> Result<(), String> {
    fs::create_dir_all(out_dir)
        .map_err(|err| format!("Failed to create {}: {err}", out_dir.display()))?;

    for entry in fs::read_dir(out_dir)
        .map_err(|err| format!("Failed to list {}: {err}", out_dir.display()))?
    {
        let entry = entry.map_err(|err| format!("Failed to read entry: {err}"))?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) == Some("ts") {
            fs::remove_file(&path)
                .map_err(|err| format!("Failed to remove {}: {err}", path.display()))?;
        }
    }

    export_single_type::<catalog::ContentFormat>(out_dir)?;
    export_single_type::<catalog::WorkType>(out_dir)?;
    export_single_type::<document::DocumentStatus>(out_dir)?;
    export_single_type::<engagement::EntityKind>(out_dir)?;
    export_single_type::<engagement::EngagementState>(out_dir)?;
    export_single_type::<viewport::ViewportState>(out_dir)?;

    let index_content = r#"export type { ContentFormat } from "./ContentFormat";
export type { WorkType } from "./WorkType";
export type { DocumentStatus } from "./DocumentStatus";
export type { EntityKind } from "./EntityKind";
export type { EngagementState } from "./EngagementState";
export type { ViewportState } from "./ViewportState";
"#;
    fs::write(out_dir.join("index.ts"), index_content)
        .map_err(|err| format!("Failed to write index.ts: {err}"))?;

    Ok(())
}
