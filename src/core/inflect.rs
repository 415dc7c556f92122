//! English inflection heuristics for the linguistic built-in modifiers.
//!
//! Irregular forms come from small tables; everything else falls through to
//! suffix rules. Only the last word of a phrase is inflected, and its
//! capitalization is carried over to the result.

const IRREGULAR_PLURALS: &[(&str, &str)] = &[
    ("analysis", "analyses"),
    ("axis", "axes"),
    ("bus", "buses"),
    ("cactus", "cacti"),
    ("calf", "calves"),
    ("child", "children"),
    ("crisis", "crises"),
    ("criterion", "criteria"),
    ("die", "dice"),
    ("echo", "echoes"),
    ("elf", "elves"),
    ("foot", "feet"),
    ("fungus", "fungi"),
    ("gas", "gases"),
    ("goose", "geese"),
    ("half", "halves"),
    ("hero", "heroes"),
    ("index", "indices"),
    ("knife", "knives"),
    ("leaf", "leaves"),
    ("life", "lives"),
    ("loaf", "loaves"),
    ("louse", "lice"),
    ("matrix", "matrices"),
    ("mouse", "mice"),
    ("octopus", "octopi"),
    ("ox", "oxen"),
    ("person", "people"),
    ("phenomenon", "phenomena"),
    ("potato", "potatoes"),
    ("self", "selves"),
    ("shelf", "shelves"),
    ("thief", "thieves"),
    ("tomato", "tomatoes"),
    ("tooth", "teeth"),
    ("torpedo", "torpedoes"),
    ("vertex", "vertices"),
    ("veto", "vetoes"),
    ("wife", "wives"),
    ("wolf", "wolves"),
    ("woman", "women"),
];

const UNCOUNTABLE: &[&str] = &[
    "aircraft",
    "bison",
    "deer",
    "equipment",
    "fish",
    "information",
    "money",
    "moose",
    "news",
    "rice",
    "salmon",
    "series",
    "sheep",
    "species",
    "swine",
    "trout",
];

/// Words ending in "man" that do not pluralize to "men".
const NOT_MAN_COMPOUNDS: &[&str] = &["caiman", "german", "human", "shaman", "talisman"];

/// Singular forms ending in "ie", whose plurals would otherwise read as "-y".
const IE_SINGULARS: &[&str] = &[
    "calorie", "cookie", "lie", "movie", "pie", "rookie", "tie", "zombie",
];

/// Vowel-initial words that take "a".
const CONSONANT_SOUND_PREFIXES: &[&str] = &[
    "eu", "ewe", "one", "once", "ubiq", "uni", "ura", "ure", "uro", "usa", "use", "usu", "uti", "uto",
];

/// Words whose silent "h" takes "an".
const SILENT_H_PREFIXES: &[&str] = &["heir", "herb", "honest", "honor", "honour", "hour"];

/// Split a phrase into everything before its last word and the last word.
fn split_last_word(phrase: &str) -> (&str, &str) {
    let trimmed = phrase.trim_end();
    let start = trimmed
        .char_indices()
        .rev()
        .find(|(_, c)| c.is_whitespace())
        .map(|(i, c)| i + c.len_utf8())
        .unwrap_or(0);
    (&phrase[..start], &trimmed[start..])
}

/// Re-apply `original`'s capitalization to an inflected lowercase word.
fn match_case(original: &str, inflected: &str) -> String {
    let letters: Vec<char> = original.chars().filter(|c| c.is_alphabetic()).collect();
    if letters.len() > 1 && letters.iter().all(|c| c.is_uppercase()) {
        return inflected.to_uppercase();
    }
    if original.chars().next().map_or(false, char::is_uppercase) {
        return capitalize(inflected);
    }
    inflected.to_string()
}

fn inflect_last_word(phrase: &str, inflect: fn(&str) -> String) -> String {
    let (head, word) = split_last_word(phrase);
    if word.is_empty() {
        return phrase.to_string();
    }
    let tail = &phrase[head.len() + word.len()..];
    let inflected = inflect(&word.to_lowercase());
    format!("{}{}{}", head, match_case(word, &inflected), tail)
}

/// Uppercase the first character.
pub fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Uppercase the first character of every whitespace-separated word.
pub fn capitalize_all(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_word_start = true;
    for c in text.chars() {
        if at_word_start && !c.is_whitespace() {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        at_word_start = c.is_whitespace();
    }
    out
}

/// "a" or "an" for the first word of `phrase`.
pub fn indefinite_article(phrase: &str) -> &'static str {
    let word = phrase
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_lowercase();

    let Some(first) = word.chars().next() else {
        return "a";
    };
    if first == '8' || word == "11" || word == "18" {
        return "an";
    }
    if SILENT_H_PREFIXES.iter().any(|p| word.starts_with(p)) {
        return "an";
    }
    if matches!(first, 'a' | 'e' | 'i' | 'o' | 'u') {
        if CONSONANT_SOUND_PREFIXES.iter().any(|p| word.starts_with(p)) {
            return "a";
        }
        return "an";
    }
    "a"
}

/// Prefix `phrase` with its indefinite article.
pub fn with_article(phrase: &str) -> String {
    if phrase.trim().is_empty() {
        return phrase.to_string();
    }
    format!("{} {}", indefinite_article(phrase), phrase)
}

fn plural_word(word: &str) -> String {
    if UNCOUNTABLE.contains(&word) {
        return word.to_string();
    }
    if let Some(&(_, plural)) = IRREGULAR_PLURALS.iter().find(|(s, _)| *s == word) {
        return plural.to_string();
    }
    if let Some(stem) = word.strip_suffix("man") {
        if !NOT_MAN_COMPOUNDS.contains(&word) {
            return format!("{}men", stem);
        }
    }
    if ["s", "x", "z", "ch", "sh"].iter().any(|s| word.ends_with(s)) {
        return format!("{}es", word);
    }
    if let Some(stem) = word.strip_suffix('y') {
        if stem.chars().last().map_or(false, |c| !"aeiou".contains(c)) {
            return format!("{}ies", stem);
        }
    }
    format!("{}s", word)
}

fn singular_word(word: &str) -> String {
    if UNCOUNTABLE.contains(&word) {
        return word.to_string();
    }
    if let Some(&(singular, _)) = IRREGULAR_PLURALS.iter().find(|(_, p)| *p == word) {
        return singular.to_string();
    }
    if let Some(stem) = word.strip_suffix("men") {
        if !stem.is_empty() && !word.ends_with("omen") && !word.ends_with("imen") {
            return format!("{}man", stem);
        }
    }
    if let Some(stem) = word.strip_suffix("ies") {
        if IE_SINGULARS.iter().any(|s| s.strip_suffix("ie") == Some(stem)) {
            return format!("{}ie", stem);
        }
        if !stem.is_empty() {
            return format!("{}y", stem);
        }
    }
    if ["sses", "xes", "zzes", "ches", "shes"].iter().any(|s| word.ends_with(s)) {
        return word[..word.len() - 2].to_string();
    }
    if word.ends_with("ss") || word.ends_with("us") || word.ends_with("is") {
        return word.to_string();
    }
    match word.strip_suffix('s') {
        Some(stem) if !stem.is_empty() => stem.to_string(),
        _ => word.to_string(),
    }
}

/// Pluralize the last word of `phrase`.
pub fn pluralize(phrase: &str) -> String {
    inflect_last_word(phrase, plural_word)
}

/// Singularize the last word of `phrase`.
pub fn singularize(phrase: &str) -> String {
    inflect_last_word(phrase, singular_word)
}

/// Possessive form: `'s`, or a bare apostrophe after a trailing "s".
pub fn possessive(phrase: &str) -> String {
    if phrase.trim().is_empty() {
        return phrase.to_string();
    }
    if phrase.ends_with('s') || phrase.ends_with('S') {
        format!("{}'", phrase)
    } else {
        format!("{}'s", phrase)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("cat", "a cat")]
    #[case("apple", "an apple")]
    #[case("hour", "an hour")]
    #[case("honest man", "an honest man")]
    #[case("unicorn", "a unicorn")]
    #[case("European", "a European")]
    #[case("one-eyed cat", "a one-eyed cat")]
    #[case("umbrella", "an umbrella")]
    #[case("Owl", "an Owl")]
    #[case("8-bit sprite", "an 8-bit sprite")]
    #[case("house", "a house")]
    fn articles(#[case] phrase: &str, #[case] expected: &str) {
        assert_eq!(with_article(phrase), expected);
    }

    #[rstest]
    #[case("cat", "cats")]
    #[case("box", "boxes")]
    #[case("church", "churches")]
    #[case("city", "cities")]
    #[case("day", "days")]
    #[case("mouse", "mice")]
    #[case("sheep", "sheep")]
    #[case("fireman", "firemen")]
    #[case("human", "humans")]
    #[case("wolf", "wolves")]
    #[case("big dog", "big dogs")]
    #[case("Child", "Children")]
    #[case("OX", "OXEN")]
    fn plurals(#[case] singular: &str, #[case] plural: &str) {
        assert_eq!(pluralize(singular), plural);
    }

    #[rstest]
    #[case("cats", "cat")]
    #[case("boxes", "box")]
    #[case("churches", "church")]
    #[case("classes", "class")]
    #[case("cities", "city")]
    #[case("movies", "movie")]
    #[case("horses", "horse")]
    #[case("mice", "mouse")]
    #[case("firemen", "fireman")]
    #[case("women", "woman")]
    #[case("omens", "omen")]
    #[case("glass", "glass")]
    #[case("status", "status")]
    #[case("big dogs", "big dog")]
    fn singulars(#[case] plural: &str, #[case] singular: &str) {
        assert_eq!(singularize(plural), singular);
    }

    #[test]
    fn trailing_whitespace_is_kept() {
        assert_eq!(pluralize("cat "), "cats ");
        assert_eq!(pluralize(""), "");
    }

    #[test]
    fn possessives() {
        assert_eq!(possessive("cat"), "cat's");
        assert_eq!(possessive("cats"), "cats'");
        assert_eq!(possessive(""), "");
    }

    #[test]
    fn capitalization() {
        assert_eq!(capitalize("cat dog"), "Cat dog");
        assert_eq!(capitalize(""), "");
        assert_eq!(capitalize("élan"), "Élan");
        assert_eq!(capitalize_all("cat  dog\tbird"), "Cat  Dog\tBird");
    }
}
