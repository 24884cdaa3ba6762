//! Builds the session instructions from the persona preamble and profile.

use talkypie_store::Profile;

/// Persona and behavior rules prepended to every session's instructions.
pub const DEFAULT_PREAMBLE: &str = "Greet user as his name is known from the profile,like hii <name>! \
I am Talkypie, How can I assist you today?.\
Dont take name of user multiple times in a single response. \
You are a kid assistant, who helps engage kids in a fun playful manner. \
Please be concise in your responses. Use very simple language that kids can understand and use short sentences. \
Your responses are concise, to the point, and without emojis or symbols.";

/// Introduces the profile clause.
pub const PROFILE_FRAMING: &str = "Use this profile to tailor responses:";

/// Composes `preamble` with a clause describing the present profile fields.
///
/// Fields appear in the fixed order name, age, gender, likes, learning, and
/// absent fields are skipped. With no profile, or a profile with no
/// present fields, the result is exactly `preamble`.
pub fn compose_instructions(preamble: &str, profile: Option<&Profile>) -> String {
    match profile.map(profile_clause) {
        Some(clause) if !clause.is_empty() => format!("{preamble} {clause}"),
        _ => preamble.to_string(),
    }
}

fn profile_clause(profile: &Profile) -> String {
    let fragments: Vec<String> = [
        profile.name.as_ref().map(|v| format!("Child name: {v}.")),
        profile.age.as_ref().map(|v| format!("Age: {v}.")),
        profile.gender.as_ref().map(|v| format!("Gender: {v}.")),
        profile.likes.as_ref().map(|v| format!("Likes: {v}.")),
        profile.learning.as_ref().map(|v| format!("Current learning: {v}")),
    ]
    .into_iter()
    .flatten()
    .collect();

    if fragments.is_empty() {
        String::new()
    } else {
        format!("{PROFILE_FRAMING} {}", fragments.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(name: Option<&str>, likes: Option<&str>) -> Profile {
        Profile {
            name: name.map(str::to_string),
            likes: likes.map(str::to_string),
            ..Profile::default()
        }
    }

    #[test]
    fn default_preamble_keeps_persona_wording() {
        assert!(DEFAULT_PREAMBLE.starts_with(
            "Greet user as his name is known from the profile,like hii <name>! \
             I am Talkypie, How can I assist you today?.Dont take name of user"
        ));
        assert!(DEFAULT_PREAMBLE.ends_with("without emojis or symbols."));
    }

    #[test]
    fn absent_profile_yields_preamble() {
        assert_eq!(compose_instructions("Hi I am Pie.", None), "Hi I am Pie.");
    }

    #[test]
    fn empty_profile_yields_preamble() {
        assert_eq!(
            compose_instructions("Hi I am Pie.", Some(&Profile::default())),
            "Hi I am Pie."
        );
    }

    #[test]
    fn name_and_likes_in_order() {
        let composed = compose_instructions("Hi I am Pie.", Some(&profile(Some("Ava"), Some("dinosaurs"))));

        assert_eq!(
            composed,
            "Hi I am Pie. Use this profile to tailor responses: Child name: Ava. Likes: dinosaurs."
        );
        assert!(!composed.contains("Age:"));
        assert!(!composed.contains("Gender:"));
        assert!(!composed.contains("Current learning:"));
    }

    #[test]
    fn all_fields_follow_fixed_order() {
        let full = Profile {
            name: Some("Ava".into()),
            age: Some("6".into()),
            gender: Some("girl".into()),
            likes: Some("dinosaurs".into()),
            learning: Some("counting".into()),
        };
        let composed = compose_instructions("P.", Some(&full));

        assert_eq!(
            composed,
            "P. Use this profile to tailor responses: Child name: Ava. Age: 6. Gender: girl. \
             Likes: dinosaurs. Current learning: counting"
        );
    }

    #[test]
    fn composition_is_deterministic() {
        let p = profile(Some("Ava"), None);
        assert_eq!(
            compose_instructions(DEFAULT_PREAMBLE, Some(&p)),
            compose_instructions(DEFAULT_PREAMBLE, Some(&p))
        );
    }
}
