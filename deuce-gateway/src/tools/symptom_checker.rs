use serde_json::{Value, json};

use super::{FieldKind, FieldSpec, OutputSchema, Tool, ToolSchema};

pub const SYMPTOMS: &[&str] = &[
    "abdominal pain",
    "back pain",
    "bleeding",
    "body aches",
    "chest pain",
    "chills",
    "confusion",
    "cough",
    "diarrhea",
    "dizziness",
    "fainting",
    "fatigue",
    "fever",
    "headache",
    "insomnia",
    "nausea",
    "palpitations",
    "rash",
    "shortness of breath",
    "sore throat",
    "vomiting",
];

const EMERGENCY: &[&str] = &["chest pain", "confusion", "fainting", "shortness of breath"];

const TRIGGERS: &[&str] = &[
    "symptom*",
    "feel sick",
    "feeling sick",
    "feel unwell",
    "feeling unwell",
    "abdominal pain",
    "back pain",
    "body aches",
    "chest pain",
    "chills",
    "cough*",
    "diarrhea",
    "dizz*",
    "fainting",
    "fatigue",
    "fever",
    "headache*",
    "insomnia",
    "nausea",
    "palpitations",
    "rash",
    "shortness of breath",
    "sore throat",
    "vomiting",
];

fn advice_for(symptom: &str) -> &'static str {
    match symptom {
        "fever" | "chills" => "Rest, drink fluids and track your temperature.",
        "headache" => "Hydrate, rest in a dark room and limit screen time.",
        "cough" | "sore throat" => "Warm fluids and rest help; see a doctor if it lasts over a week.",
        "nausea" | "vomiting" | "diarrhea" => "Sip oral rehydration fluids and eat bland food.",
        "fatigue" | "insomnia" => "Keep a regular sleep schedule and reduce caffeine.",
        "dizziness" | "palpitations" => "Sit down, hydrate and avoid sudden movements.",
        "chest pain" | "shortness of breath" | "fainting" | "confusion" => {
            "Seek emergency care immediately."
        }
        "bleeding" => "Apply pressure and seek care if bleeding is heavy or does not stop.",
        _ => "Monitor the symptom and consult a doctor if it worsens.",
    }
}

/// Maps reported symptoms to an urgency level and self-care advice.
pub struct SymptomCheckerTool {
    schema: ToolSchema,
}

impl SymptomCheckerTool {
    pub fn new() -> Self {
        Self {
            schema: ToolSchema::new(vec![FieldSpec::required(
                "symptoms",
                FieldKind::Keywords(SYMPTOMS),
                "which symptoms you are experiencing",
            )]),
        }
    }
}

impl Default for SymptomCheckerTool {
    fn default() -> Self {
        Self::new()
    }
}

impl Tool for SymptomCheckerTool {
    fn name(&self) -> &str {
        "symptom_checker"
    }

    fn description(&self) -> &str {
        "Assesses reported symptoms and suggests how urgently to seek care."
    }

    fn triggers(&self) -> &[&'static str] {
        TRIGGERS
    }

    fn input_schema(&self) -> &ToolSchema {
        &self.schema
    }

    fn output_schema(&self) -> OutputSchema {
        OutputSchema::new(&["symptoms", "urgency", "advice"])
    }

    fn compute(&self, input: &Value) -> Result<Value, String> {
        let mut symptoms: Vec<&str> = input["symptoms"]
            .as_array()
            .map(|items| items.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();
        symptoms.sort_unstable();
        symptoms.dedup();
        if symptoms.is_empty() {
            return Err("no symptoms supplied".to_string());
        }

        let urgency = if symptoms.iter().any(|s| EMERGENCY.contains(s)) {
            "emergency"
        } else if symptoms.len() >= 3 || symptoms.contains(&"bleeding") {
            "see a doctor soon"
        } else {
            "self-care"
        };

        let mut advice: Vec<&str> = symptoms.iter().map(|s| advice_for(s)).collect();
        advice.dedup();

        Ok(json!({
            "summary": format!("Reported {}; urgency: {urgency}.", symptoms.join(", ")),
            "symptoms": symptoms,
            "urgency": urgency,
            "advice": advice,
        }))
    }
}
