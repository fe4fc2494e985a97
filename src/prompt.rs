use crate::context::{ContextSummary, FilterCriteria};

const ADVICE_TEMPLATE: &str = concat!(
    "Based on the following patient context:\n",
    "{context}\n\n",
    "What preventative health measures should a patient in the {age_category} age group with a ",
    "smoker status of '{smoker_status}' and {conditions} take?\n",
    "Provide advice on lifestyle changes, screening tests, and vaccination recommendations.\n"
);

fn describe_conditions(criteria: &FilterCriteria) -> String {
    let selected: Vec<&str> = criteria.required_conditions().collect();
    if selected.is_empty() {
        "no specified health conditions".to_string()
    } else {
        format!("the health conditions {}", selected.join(", "))
    }
}

/// Prompt asking for preventative advice, grounded in the summarized context.
pub fn advice_prompt(summary: &ContextSummary) -> String {
    let criteria = &summary.criteria;
    ADVICE_TEMPLATE
        .replace("{age_category}", &criteria.age_category)
        .replace("{smoker_status}", &criteria.smoker_status)
        .replace("{conditions}", &describe_conditions(criteria))
        // last, so placeholders inside the data are left alone
        .replace("{context}", summary.as_str())
}
