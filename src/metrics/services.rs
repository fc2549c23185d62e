use super::dto::AnalyzeImageRequest;

/// Prompt asking the model to read a body-composition scan into JSON.
pub fn scan_prompt(req: &AnalyzeImageRequest) -> String {
    if let Some(custom) = req.prompt.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        return custom.to_string();
    }

    let mut profile = Vec::new();
    if let Some(name) = req.fullname.as_deref().filter(|s| !s.trim().is_empty()) {
        profile.push(format!("name: {}", name.trim()));
    }
    if let Some(gender) = req.gender.as_deref().filter(|s| !s.trim().is_empty()) {
        profile.push(format!("gender: {}", gender.trim()));
    }
    if let Some(height) = req.height {
        profile.push(format!("height: {height} cm"));
    }
    if let Some(age) = req.age {
        profile.push(format!("age: {age}"));
    }
    let profile = if profile.is_empty() {
        "unknown".to_string()
    } else {
        profile.join(", ")
    };

    format!(
        "You are a fitness coach reading a body-composition scan printout. \
         Client profile: {profile}. \
         Extract the measurements from the image and reply with JSON only, no prose, \
         using these keys (null when not visible): weight_kg, body_fat_pct, mineral_kg, \
         water_pct, muscle_mass_kg, physique_rating, bmr_kcal, metabolic_age, visceral_fat, \
         and analysis (a short assessment with advice for this client)."
    )
}
