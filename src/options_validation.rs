//! Validation of per-request task options.
//!
//! Called by every task before tokenization so malformed options are
//! rejected as [`TaskError::InvalidArgument`] without touching the backend.

use crate::api::{
    GenerationOptions, QuestionAnsweringOptions, TextClassificationParameters, ZeroShotParameters,
};
use crate::error::{Result, TaskError};

fn invalid(msg: impl Into<String>) -> TaskError {
    TaskError::InvalidArgument(msg.into())
}

/// Upper bound on the QA span-selection counts.
pub const MAX_QA_LIMIT: usize = 1 << 16;

/// `min_score` must be a probability and the span counts at most
/// [`MAX_QA_LIMIT`].
pub fn validate_qa_options(options: &QuestionAnsweringOptions) -> Result<()> {
    for (name, value) in [
        ("max_answers", options.max_answers),
        ("max_answer_length", options.max_answer_length),
        ("max_candidates", options.max_candidates),
    ] {
        if value > MAX_QA_LIMIT {
            return Err(invalid(format!(
                "{} must be at most {}, got {}",
                name, MAX_QA_LIMIT, value
            )));
        }
    }
    if !options.min_score.is_finite() || !(0.0..=1.0).contains(&options.min_score) {
        return Err(invalid(format!(
            "min_score must be within [0, 1], got {}",
            options.min_score
        )));
    }
    Ok(())
}

/// Candidate labels must be present and non-blank; a custom template must
/// contain the `{}` placeholder.
pub fn validate_zero_shot_parameters(parameters: &ZeroShotParameters) -> Result<()> {
    if parameters.candidate_labels.is_empty() {
        return Err(invalid("candidate_labels must not be empty"));
    }
    if let Some(i) = parameters
        .candidate_labels
        .iter()
        .position(|l| l.trim().is_empty())
    {
        return Err(invalid(format!("candidate_labels[{}] is blank", i)));
    }
    if !parameters.template().contains("{}") {
        return Err(invalid(format!(
            "hypothesis_template '{}' has no '{{}}' placeholder",
            parameters.hypothesis_template
        )));
    }
    Ok(())
}

pub fn validate_text_classification_parameters(
    parameters: &TextClassificationParameters,
) -> Result<()> {
    require_positive("top_k", parameters.top_k)
}

/// Length, beam and sampling parameters must be in range when set.
pub fn validate_generation_options(options: &GenerationOptions) -> Result<()> {
    require_positive("max_length", options.max_length)?;
    require_positive("num_beams", options.num_beams)?;
    require_positive("num_return_sequences", options.num_return_sequences)?;
    require_positive("top_k", options.top_k)?;
    if let (Some(min), Some(max)) = (options.min_length, options.max_length)
        && min > max
    {
        return Err(invalid(format!(
            "min_length {} exceeds max_length {}",
            min, max
        )));
    }
    if let Some(t) = options.temperature
        && !(t.is_finite() && t > 0.0)
    {
        return Err(invalid(format!("temperature must be > 0, got {}", t)));
    }
    if let Some(p) = options.top_p
        && !(p > 0.0 && p <= 1.0)
    {
        return Err(invalid(format!("top_p must be within (0, 1], got {}", p)));
    }
    Ok(())
}

fn require_positive(name: &str, value: Option<usize>) -> Result<()> {
    match value {
        Some(0) => Err(invalid(format!("{} must be greater than 0", name))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn qa_min_score_out_of_range_is_rejected() {
        let mut opts = QuestionAnsweringOptions::default();
        assert!(validate_qa_options(&opts).is_ok());
        opts.min_score = 1.5;
        assert!(matches!(
            validate_qa_options(&opts),
            Err(TaskError::InvalidArgument(_))
        ));
        opts.min_score = f64::NAN;
        assert!(validate_qa_options(&opts).is_err());
    }

    #[test]
    fn qa_oversized_limits_are_rejected() {
        let opts = QuestionAnsweringOptions {
            max_answer_length: usize::MAX,
            ..Default::default()
        };
        assert!(matches!(
            validate_qa_options(&opts),
            Err(TaskError::InvalidArgument(msg)) if msg.contains("max_answer_length")
        ));
        let opts = QuestionAnsweringOptions {
            max_candidates: MAX_QA_LIMIT + 1,
            ..Default::default()
        };
        assert!(validate_qa_options(&opts).is_err());
        let opts = QuestionAnsweringOptions {
            max_answers: MAX_QA_LIMIT,
            ..Default::default()
        };
        assert!(validate_qa_options(&opts).is_ok());
    }

    #[test]
    fn zero_shot_requires_labels() {
        let params = ZeroShotParameters::default();
        assert!(matches!(
            validate_zero_shot_parameters(&params),
            Err(TaskError::InvalidArgument(_))
        ));
    }

    #[test]
    fn zero_shot_rejects_blank_label() {
        let params = ZeroShotParameters {
            candidate_labels: vec!["sports".into(), "  ".into()],
            ..Default::default()
        };
        assert!(validate_zero_shot_parameters(&params).is_err());
    }

    #[test]
    fn zero_shot_template_needs_placeholder() {
        let mut params = ZeroShotParameters {
            candidate_labels: vec!["sports".into()],
            hypothesis_template: "This is about sports.".into(),
            multi_label: false,
        };
        assert!(validate_zero_shot_parameters(&params).is_err());
        params.hypothesis_template = "This is about {}.".into();
        assert!(validate_zero_shot_parameters(&params).is_ok());
    }

    #[test]
    fn generation_defaults_are_valid() {
        assert!(validate_generation_options(&GenerationOptions::default()).is_ok());
    }

    #[test]
    fn generation_rejects_bad_ranges() {
        let cases = [
            GenerationOptions {
                num_beams: Some(0),
                ..Default::default()
            },
            GenerationOptions {
                min_length: Some(10),
                max_length: Some(5),
                ..Default::default()
            },
            GenerationOptions {
                temperature: Some(0.0),
                ..Default::default()
            },
            GenerationOptions {
                top_p: Some(1.5),
                ..Default::default()
            },
        ];
        for case in cases {
            assert!(
                matches!(
                    validate_generation_options(&case),
                    Err(TaskError::InvalidArgument(_))
                ),
                "{:?} should be rejected",
                case
            );
        }
    }
}
