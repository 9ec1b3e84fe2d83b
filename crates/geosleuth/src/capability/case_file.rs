//! Record access for the reasoning backend

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{parse_arguments, schema_of, Capability, CapabilityKind, CapabilityResult};
use crate::{
    capability::CapabilityError,
    record::{FindingSink, RecordReader, RecordSnapshot, ValidatedFinding},
};

#[derive(Debug, Clone, Copy, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
enum CaseFileAction {
    /// Seed features, metadata, corrections, context hints and validated findings
    GetState,
    /// One named field of the case file
    GetField,
    /// The complete case file including prior summaries
    ToDict,
    /// Record a finding that has been verified by at least one lookup
    AddFinding,
}

#[derive(Debug, Deserialize, JsonSchema)]
struct CaseFileArgs {
    action: CaseFileAction,
    /// Field name for get_field: seed_features, metadata, source, corrections,
    /// context_hints, validated_findings or summaries
    #[serde(default)]
    field: Option<String>,
    /// Finding text for add_finding
    #[serde(default)]
    finding: Option<String>,
    /// Where the finding was confirmed (URL, capability name)
    #[serde(default)]
    source: Option<String>,
}

/// Read access to the investigation record plus a finding appender
pub struct CaseFileCapability {
    reader: RecordReader,
    findings: FindingSink,
}

impl CaseFileCapability {
    pub fn new(reader: RecordReader, findings: FindingSink) -> Self {
        Self { reader, findings }
    }

    fn state(snapshot: &RecordSnapshot) -> Value {
        json!({
            "seed_features": snapshot.seed.features,
            "metadata": snapshot.seed.metadata,
            "corrections": snapshot.corrections,
            "context_hints": snapshot.context_hints,
            "validated_findings": snapshot.validated_findings,
        })
    }
}

#[async_trait]
impl Capability for CaseFileCapability {
    fn name(&self) -> &str {
        "case_file"
    }

    fn description(&self) -> &str {
        "Read the investigation case file: the clues extracted from the image, user \
         corrections of wrong guesses, user context hints, validated findings and prior \
         summaries. Actions: 'get_state', 'get_field' (requires 'field'), 'to_dict'. \
         Use 'add_finding' (requires 'finding') to record a fact you have verified."
    }

    fn kind(&self) -> CapabilityKind {
        CapabilityKind::RecordAccess
    }

    fn parameter_schema(&self) -> Value {
        schema_of::<CaseFileArgs>()
    }

    async fn invoke(&self, arguments: Value) -> Result<CapabilityResult, CapabilityError> {
        let args: CaseFileArgs = parse_arguments(arguments)?;
        let snapshot = self.reader.snapshot();

        let result = match args.action {
            CaseFileAction::GetState => CapabilityResult::ok(Self::state(&snapshot))
                .with_metadata(json!({"action": "get_state"})),
            CaseFileAction::GetField => {
                let Some(field) = args.field.filter(|f| !f.trim().is_empty()) else {
                    return Ok(CapabilityResult::failure(
                        "'field' parameter is required for get_field action",
                    ));
                };
                match snapshot.field(&field) {
                    Some(value) => {
                        let mut data = serde_json::Map::new();
                        data.insert(field.clone(), value);
                        CapabilityResult::ok(Value::Object(data))
                            .with_metadata(json!({"action": "get_field", "field": field}))
                    }
                    None => CapabilityResult::failure(format!(
                        "Unknown field '{}'. Valid fields: {}",
                        field,
                        RecordSnapshot::FIELDS.join(", ")
                    )),
                }
            }
            CaseFileAction::ToDict => match serde_json::to_value(&snapshot) {
                Ok(data) => CapabilityResult::ok(data).with_metadata(json!({"action": "to_dict"})),
                Err(e) => CapabilityResult::failure(format!("case file not serializable: {}", e)),
            },
            CaseFileAction::AddFinding => {
                let Some(description) = args.finding.filter(|f| !f.trim().is_empty()) else {
                    return Ok(CapabilityResult::failure(
                        "'finding' parameter is required for add_finding action",
                    ));
                };
                let mut finding = ValidatedFinding::new(description);
                finding.source = args.source;
                if !self.findings.add(finding) {
                    return Ok(CapabilityResult::failure("investigation record is closed"));
                }
                tracing::info!("[CAPABILITY] case_file queued a validated finding");
                CapabilityResult::ok(json!({"queued": true}))
                    .with_metadata(json!({"action": "add_finding"}))
            }
        };

        Ok(result)
    }
}
