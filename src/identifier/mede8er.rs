use super::{ArtifactKind, IdentifierStrategy, Result, Target, TargetKind, needs_refresh};
use crate::engine::Action;
use quick_xml::se::to_string;
use serde::Serialize;
use std::path::PathBuf;

const VIEW_FILE: &str = "View.xml";

#[derive(Serialize)]
#[serde(rename = "FolderTag")]
struct FolderTag {
    #[serde(rename = "ViewMode")]
    view_mode: &'static str,
    #[serde(rename = "ViewType")]
    view_type: &'static str,
}

/// Mede8er player `View.xml` for show and season folders
#[derive(Debug, Clone, Copy, Default)]
pub struct Mede8erView;

impl Mede8erView {
    fn render(season: bool) -> Result<String> {
        let tag = FolderTag {
            view_mode: if season { "Video" } else { "Movie" },
            view_type: "Video",
        };
        Ok(format!(
            "<?xml version=\"1.0\" encoding=\"utf-8\"?>\n{}",
            to_string(&tag)?
        ))
    }
}

impl IdentifierStrategy for Mede8erView {
    fn name(&self) -> &'static str {
        "mede8er view"
    }

    fn artifact_kind(&self) -> ArtifactKind {
        ArtifactKind::Metadata
    }

    fn targets(&self) -> &'static [TargetKind] {
        &[TargetKind::Show, TargetKind::Season]
    }

    fn propose_actions(&self, target: &Target<'_>, force: bool) -> Result<Vec<Action>> {
        let (folder, season): (PathBuf, bool) = match *target {
            Target::Show { show, .. } => (show.folder.clone(), false),
            Target::Season { show, season, .. } => (show.season_folder(season), true),
            Target::Episode { .. } => return Ok(Vec::new()),
        };

        let file = folder.join(VIEW_FILE);
        if !needs_refresh(&file, target.last_updated(), force) {
            return Ok(Vec::new());
        }
        Ok(vec![Action::write_metadata(file, Self::render(season)?)])
    }
}
