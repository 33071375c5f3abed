//! `dataset_description.json`/`README` templates and the placeholder
//! substitution rules of spec §4.1 step 2.
//!
//! Templates are embedded in the binary (no runtime template search path);
//! substitution is a plain string replace of the empty-quoted or
//! empty-braced placeholder, exactly as spec.md describes, and is the
//! plainest possible reading of "the source seeds fields by text
//! substitution on placeholder strings" — no JSON-aware patching.

use chrono::Utc;

use crate::error::OrchestratorError;

/// The literal placeholder for an empty string field, e.g. `"URI": ""`.
const URI_PLACEHOLDER: &str = "\"URI\": \"\"";

/// The literal placeholder for an empty object field, e.g.
/// `"DatasetLinks": {}`.
const DATASET_LINKS_PLACEHOLDER: &str = "\"DatasetLinks\": {}";

/// One of the three derivative roots named in spec §3/§4.1.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DerivativeRoot {
    FreeSurfer,
    SimNibs,
    TiToolbox,
}

impl DerivativeRoot {
    /// The on-disk directory name under `derivatives/`.
    pub fn dir_name(self) -> &'static str {
        match self {
            DerivativeRoot::FreeSurfer => "freesurfer",
            DerivativeRoot::SimNibs => "SimNIBS",
            DerivativeRoot::TiToolbox => "ti-toolbox",
        }
    }

    fn template(self) -> &'static str {
        match self {
            DerivativeRoot::FreeSurfer => FREESURFER_TEMPLATE,
            DerivativeRoot::SimNibs => SIMNIBS_TEMPLATE,
            DerivativeRoot::TiToolbox => TI_TOOLBOX_TEMPLATE,
        }
    }
}

pub const ALL_DERIVATIVE_ROOTS: [DerivativeRoot; 3] = [
    DerivativeRoot::FreeSurfer,
    DerivativeRoot::SimNibs,
    DerivativeRoot::TiToolbox,
];

const FREESURFER_TEMPLATE: &str = r#"{
  "Name": "FreeSurfer cortical reconstructions",
  "BIDSVersion": "1.8.0",
  "DatasetType": "derivative",
  "GeneratedBy": [
    { "Name": "FreeSurfer", "Version": "unknown" }
  ],
  "URI": "",
  "DatasetLinks": {}
}
"#;

const SIMNIBS_TEMPLATE: &str = r#"{
  "Name": "SimNIBS head models",
  "BIDSVersion": "1.8.0",
  "DatasetType": "derivative",
  "GeneratedBy": [
    { "Name": "SimNIBS", "Version": "unknown" }
  ],
  "URI": "",
  "DatasetLinks": {}
}
"#;

const TI_TOOLBOX_TEMPLATE: &str = r#"{
  "Name": "TI-toolbox tissue analysis and logs",
  "BIDSVersion": "1.8.0",
  "DatasetType": "derivative",
  "GeneratedBy": [
    { "Name": "ti-toolbox", "Version": "unknown" }
  ],
  "URI": "",
  "DatasetLinks": {}
}
"#;

const ROOT_DATASET_DESCRIPTION_TEMPLATE: &str = r#"{
  "Name": "",
  "BIDSVersion": "1.8.0",
  "DatasetType": "raw"
}
"#;

const ROOT_README_TEMPLATE: &str = "\
This dataset is organized following the BIDS convention.

It contains raw anatomical DICOM/NIfTI data under `sourcedata/` and
`sub-*/anat/`, and derivatives produced by the structural preprocessing
pipeline (cortical reconstruction, head models, tissue analysis) under
`derivatives/`.
";

/// Render a derivative root's `dataset_description.json`, substituting the
/// `URI` and `DatasetLinks` placeholders. Fails closed
/// (`OrchestratorError::Layout`) if either placeholder is absent from the
/// template, per the Open Question resolution in DESIGN.md.
pub fn render_derivative_description(
    root: DerivativeRoot,
    project_name: &str,
) -> Result<String, OrchestratorError> {
    let template = root.template();

    if !template.contains(URI_PLACEHOLDER) || !template.contains(DATASET_LINKS_PLACEHOLDER) {
        return Err(OrchestratorError::Layout {
            project_dir: Default::default(),
            reason: format!(
                "dataset_description.json template for '{}' is missing an expected placeholder",
                root.dir_name()
            ),
        });
    }

    let date = Utc::now().format("%Y-%m-%d");
    let uri_value = format!("\"URI\": \"bids:{project_name}@{date}\"");
    let links_value = format!("\"DatasetLinks\": {{ \"{project_name}\": \"../../..\" }}");

    let rendered = template
        .replacen(URI_PLACEHOLDER, &uri_value, 1)
        .replacen(DATASET_LINKS_PLACEHOLDER, &links_value, 1);

    Ok(rendered)
}

/// Render the top-level `dataset_description.json`, setting `Name` to the
/// project basename.
pub fn render_root_description(project_name: &str) -> Result<String, OrchestratorError> {
    const NAME_PLACEHOLDER: &str = "\"Name\": \"\"";
    if !ROOT_DATASET_DESCRIPTION_TEMPLATE.contains(NAME_PLACEHOLDER) {
        return Err(OrchestratorError::Layout {
            project_dir: Default::default(),
            reason: "top-level dataset_description.json template is missing the Name placeholder"
                .to_string(),
        });
    }

    let name_value = format!("\"Name\": \"{project_name}\"");
    Ok(ROOT_DATASET_DESCRIPTION_TEMPLATE.replacen(NAME_PLACEHOLDER, &name_value, 1))
}

/// Render the top-level `README` text (no substitutions needed).
pub fn render_root_readme() -> &'static str {
    ROOT_README_TEMPLATE
}
