//! Product normalizer: folds one concatenated scraped string into structured
//! fields. Pure and deterministic; no I/O, no global state.
//!
//! Menu platforms concatenate card fields into a single text blob
//! ("Grocery | 28g Flower - Sativa | Black DieselGrocerySativaTHC: 29.21%"),
//! so the pass works over a mutable working string: each step extracts a
//! field and strips the matched text before the next step runs.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use budwatch_common::WeightUnit;

// --- Output types ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrainType {
    Sativa,
    Indica,
    Hybrid,
}

impl std::fmt::Display for StrainType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StrainType::Sativa => write!(f, "sativa"),
            StrainType::Indica => write!(f, "indica"),
            StrainType::Hybrid => write!(f, "hybrid"),
        }
    }
}

impl std::str::FromStr for StrainType {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "sativa" => Ok(Self::Sativa),
            "indica" => Ok(Self::Indica),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(format!("unknown StrainType: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Flower,
    PreRoll,
    Vape,
    Edible,
    Concentrate,
    Tincture,
    Topical,
    Other,
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Flower => write!(f, "flower"),
            Category::PreRoll => write!(f, "pre_roll"),
            Category::Vape => write!(f, "vape"),
            Category::Edible => write!(f, "edible"),
            Category::Concentrate => write!(f, "concentrate"),
            Category::Tincture => write!(f, "tincture"),
            Category::Topical => write!(f, "topical"),
            Category::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for Category {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "flower" => Ok(Self::Flower),
            "pre_roll" => Ok(Self::PreRoll),
            "vape" => Ok(Self::Vape),
            "edible" => Ok(Self::Edible),
            "concentrate" => Ok(Self::Concentrate),
            "tincture" => Ok(Self::Tincture),
            "topical" => Ok(Self::Topical),
            "other" => Ok(Self::Other),
            other => Err(format!("unknown Category: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weight {
    pub amount: f64,
    pub unit: WeightUnit,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedProduct {
    pub name: String,
    pub brand: Option<String>,
    pub category: Category,
    pub strain: Option<StrainType>,
    pub thc: Option<f64>,
    pub cbd: Option<f64>,
    pub tac: Option<f64>,
    pub weight: Option<Weight>,
    pub tags: Vec<String>,
    pub confidence: f64,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeInput<'a> {
    pub raw_name: &'a str,
    pub raw_brand: Option<&'a str>,
    pub raw_category: Option<&'a str>,
    pub raw_thc: Option<&'a str>,
    pub raw_cbd: Option<&'a str>,
}

// --- Keys ---

/// Lookup key for brand/product uniqueness: lowercase, non-alphanumeric runs
/// collapsed to single hyphens.
pub fn normalize_key(s: &str) -> String {
    static NON_ALNUM: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[^a-z0-9]+").unwrap());
    let lowered = s.to_lowercase();
    NON_ALNUM
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

// --- Regexes ---

const MARKETING_TAGS: &[&str] = &[
    "staff pick",
    "best seller",
    "new arrival",
    "limited edition",
    "on sale",
    "popular",
    "featured",
];

static TAG_PATTERNS: LazyLock<Vec<(&'static str, Regex)>> = LazyLock::new(|| {
    MARKETING_TAGS
        .iter()
        .map(|tag| {
            let escaped = regex::escape(tag).replace(r"\ ", r"[\s\-]*");
            (*tag, Regex::new(&format!(r"(?i){escaped}")).unwrap())
        })
        .collect()
});

// No leading word boundary: concatenated cards produce "SativaTHC: 29.21%".
// The trailing unit capture lets mg dosage labels pass through untouched.
static PERCENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(thc|tac|cbd)\s*:\s*(\d+(?:\.\d+)?)\s*(%|mg)?").unwrap());

static NUMBER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+(?:\.\d+)?").unwrap());

static STRAIN_WORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(sativa-hybrid|indica-hybrid|sativa|indica|hybrid)\b").unwrap()
});

// DOM concatenation glues the strain label to the end of the name with no
// separator, so no leading boundary here either.
static STRAIN_TERMINAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(sativa-hybrid|indica-hybrid|sativa|indica|hybrid)\s*$").unwrap()
});

static THC_MG_GUARD: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)thc\s*:?\s*\d+(?:\.\d+)?\s*mg\b").unwrap());

static WS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

static EDGE_TRIM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\w]+|[^\w]+$").unwrap());

static PURE_NUMERIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+\.?\d*$").unwrap());

const DESCRIPTOR_WORDS: &[&str] = &[
    "premium", "smalls", "small", "whole", "ground", "infused", "indoor", "outdoor",
];

// --- Entry point ---

pub fn normalize(input: &NormalizeInput<'_>) -> NormalizedProduct {
    let mut working = input.raw_name.to_string();

    // 1. Marketing tags
    let mut tags = Vec::new();
    for (tag, pattern) in TAG_PATTERNS.iter() {
        if pattern.is_match(&working) {
            tags.push(tag.to_string());
            working = pattern.replace_all(&working, " ").to_string();
        }
    }

    // 2. Cannabinoid percentages
    let (thc, tac, cbd, stripped) = extract_percentages(&working);
    working = stripped;
    let thc = thc.or_else(|| input.raw_thc.and_then(first_number));
    let cbd = cbd.or_else(|| input.raw_cbd.and_then(first_number));

    // 3. Strain type
    let mut strain = STRAIN_WORD
        .captures(&working)
        .map(|c| map_strain(&c[1]));
    if let Some(m) = STRAIN_TERMINAL.find(&working) {
        let terminal = map_strain(m.as_str().trim());
        if strain.is_none() {
            strain = Some(terminal);
        }
        working.truncate(m.start());
    }

    // 4. Brand de-duplication
    let brand = input
        .raw_brand
        .map(str::trim)
        .filter(|b| !b.is_empty())
        .map(str::to_string);
    if let Some(b) = &brand {
        working = strip_brand(&working, b);
    }

    // 5. Weight
    let (mut weight, stripped) = extract_weight(&working);
    working = stripped;

    // 6. Category
    let category = input
        .raw_category
        .and_then(match_category)
        .or_else(|| match_category(&working))
        .unwrap_or(Category::Other);

    // 7. Segmentation
    let (mut name, segment_brand) = pick_name(&working, brand.is_none(), &mut strain, &mut weight);
    let brand = brand.or(segment_brand);

    // 8. Whitespace and edge cleanup
    name = WS.replace_all(&name, " ").trim().to_string();
    name = EDGE_TRIM.replace_all(&name, "").to_string();

    // 9. Confidence
    let confidence = score_confidence(&name, thc, weight.as_ref(), strain);

    NormalizedProduct {
        name,
        brand,
        category,
        strain,
        thc,
        cbd,
        tac,
        weight,
        tags,
        confidence,
    }
}

// --- Steps ---

fn extract_percentages(working: &str) -> (Option<f64>, Option<f64>, Option<f64>, String) {
    let mut thc = None;
    let mut tac = None;
    let mut cbd = None;

    let mut stripped = String::with_capacity(working.len());
    let mut cursor = 0;
    for caps in PERCENT.captures_iter(working) {
        // "THC: 100mg" is a dosage, not a percentage: leave it for the
        // weight step to reject.
        if caps.get(3).map(|u| u.as_str().eq_ignore_ascii_case("mg")) == Some(true) {
            continue;
        }
        let value: f64 = match caps[2].parse() {
            Ok(v) => v,
            Err(_) => continue,
        };
        match caps[1].to_lowercase().as_str() {
            "thc" => thc = thc.or(Some(value)),
            "tac" => tac = tac.or(Some(value)),
            "cbd" => cbd = cbd.or(Some(value)),
            _ => {}
        }
        let full = caps.get(0).unwrap();
        stripped.push_str(&working[cursor..full.start()]);
        cursor = full.end();
    }
    stripped.push_str(&working[cursor..]);

    (thc, tac, cbd, stripped)
}

fn first_number(s: &str) -> Option<f64> {
    NUMBER.find(s).and_then(|m| m.as_str().parse().ok())
}

fn map_strain(token: &str) -> StrainType {
    match token.to_lowercase().as_str() {
        "sativa" | "sativa-hybrid" => StrainType::Sativa,
        "indica" | "indica-hybrid" => StrainType::Indica,
        _ => StrainType::Hybrid,
    }
}

/// Strip trailing brand variants (exact, compressed, uppercased, hyphenated)
/// and a leading brand followed by a separator. Cards frequently repeat the
/// brand on both ends of the concatenated string.
fn strip_brand(working: &str, brand: &str) -> String {
    let mut out = working.trim().to_string();

    let variants = [
        brand.to_string(),
        brand.replace(' ', ""),
        brand.to_uppercase(),
        brand.replace(' ', "-"),
    ];

    // Trailing variants can stack ("…Black DieselGroceryGROCERY"); peel until
    // none match.
    let mut changed = true;
    while changed {
        changed = false;
        for variant in &variants {
            if variant.is_empty() {
                continue;
            }
            let lower_out = out.to_lowercase();
            let lower_variant = variant.to_lowercase();
            if lower_out.ends_with(&lower_variant)
                && out.len() > variant.len()
                && out.is_char_boundary(out.len() - variant.len())
            {
                out.truncate(out.len() - variant.len());
                out = out.trim_end().trim_end_matches(['-', '|', ':', ',']).trim_end().to_string();
                changed = true;
            }
        }
    }

    // Leading "Brand | " / "Brand - " / "Brand: "
    for variant in &variants {
        if variant.is_empty() {
            continue;
        }
        let lower_out = out.to_lowercase();
        let lower_variant = variant.to_lowercase();
        if lower_out.starts_with(&lower_variant) {
            let rest = &out[variant.len()..];
            let trimmed = rest.trim_start();
            if let Some(stripped) = trimmed
                .strip_prefix('|')
                .or_else(|| trimmed.strip_prefix('-'))
                .or_else(|| trimmed.strip_prefix('–'))
                .or_else(|| trimmed.strip_prefix(':'))
            {
                out = stripped.trim_start().to_string();
                break;
            }
        }
    }

    out
}

struct WeightRule {
    pattern: &'static str,
    build: fn(Option<f64>) -> Weight,
}

static WEIGHT_RULES: LazyLock<Vec<(Regex, &'static WeightRule)>> = LazyLock::new(|| {
    static RULES: &[WeightRule] = &[
        WeightRule {
            pattern: r"(?i)(\d+(?:\.\d+)?)\s*g\b",
            build: |n| Weight { amount: n.unwrap_or(0.0), unit: WeightUnit::G },
        },
        WeightRule {
            pattern: r"(?i)(\d+(?:\.\d+)?)\s*grams?\b",
            build: |n| Weight { amount: n.unwrap_or(0.0), unit: WeightUnit::G },
        },
        WeightRule {
            pattern: r"(?i)1/8\s*oz|\beighth\b",
            build: |_| Weight { amount: 3.5, unit: WeightUnit::G },
        },
        WeightRule {
            pattern: r"(?i)1/4\s*oz|\bquarter\b",
            build: |_| Weight { amount: 7.0, unit: WeightUnit::G },
        },
        WeightRule {
            pattern: r"(?i)1/2\s*oz|\bhalf\b",
            build: |_| Weight { amount: 14.0, unit: WeightUnit::G },
        },
        WeightRule {
            pattern: r"(?i)(\d+(?:\.\d+)?)\s*(?:oz|ounces?)\b",
            build: |n| Weight { amount: 28.0 * n.unwrap_or(0.0), unit: WeightUnit::G },
        },
        WeightRule {
            pattern: r"(?i)(\d+)\s*(?:pk|pack)\b",
            build: |n| Weight { amount: n.unwrap_or(0.0), unit: WeightUnit::Pack },
        },
        WeightRule {
            pattern: r"(?i)(\d+)\s*pieces?\b",
            build: |n| Weight { amount: n.unwrap_or(0.0), unit: WeightUnit::Piece },
        },
        WeightRule {
            pattern: r"(?i)(\d+(?:\.\d+)?)\s*mg\b",
            build: |n| Weight { amount: n.unwrap_or(0.0), unit: WeightUnit::Mg },
        },
    ];
    RULES
        .iter()
        .map(|rule| (Regex::new(rule.pattern).unwrap(), rule))
        .collect()
});

fn extract_weight(working: &str) -> (Option<Weight>, String) {
    // Milligram dosage labels ("THC: 100mg") are potency, not weight. Mask
    // them so the mg rule cannot see them.
    let masked = THC_MG_GUARD.replace_all(working, |m: &regex::Captures| {
        " ".repeat(m[0].len())
    });

    for (regex, rule) in WEIGHT_RULES.iter() {
        if let Some(caps) = regex.captures(&masked) {
            let full = caps.get(0).unwrap();
            let amount = caps.get(1).and_then(|m| m.as_str().parse().ok());
            let weight = (rule.build)(amount);

            let mut stripped = String::with_capacity(working.len());
            stripped.push_str(&working[..full.start()]);
            stripped.push(' ');
            stripped.push_str(&working[full.end()..]);
            return (Some(weight), stripped);
        }
    }

    (None, working.to_string())
}

static CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (Category::PreRoll, &["pre-roll", "preroll", "pre roll", "joint", "blunt"]),
    (Category::Vape, &["vape", "cartridge", "cart", "pod", "disposable", "510"]),
    (
        Category::Edible,
        &[
            "edible", "gummy", "gummies", "chocolate", "cookie", "brownie", "chew", "candy",
            "beverage", "drink",
        ],
    ),
    (
        Category::Concentrate,
        &[
            "concentrate", "rosin", "resin", "wax", "shatter", "badder", "budder", "crumble",
            "sauce", "diamond", "dab",
        ],
    ),
    (Category::Tincture, &["tincture", "sublingual", "drops"]),
    (Category::Topical, &["topical", "lotion", "balm", "salve", "cream", "transdermal"]),
    (Category::Flower, &["flower", "bud"]),
];

pub fn match_category(text: &str) -> Option<Category> {
    let folded = text.to_lowercase();
    for (category, keywords) in CATEGORY_KEYWORDS {
        if keywords.iter().any(|k| folded.contains(k)) {
            return Some(*category);
        }
    }
    None
}

/// Whether a segment is nothing but a weight/size descriptor.
fn is_weight_descriptor(segment: &str) -> bool {
    let (weight, stripped) = extract_weight(segment);
    weight.is_some() && EDGE_TRIM.replace_all(&WS.replace_all(&stripped, " "), "").trim().is_empty()
}

fn is_descriptor_word(segment: &str) -> bool {
    let folded = segment.trim().to_lowercase();
    DESCRIPTOR_WORDS.contains(&folded.as_str())
}

/// Segment the working string and pick the product name. With pipes, the
/// last segment is the name and the first may be the brand; middle segments
/// backfill strain and weight. Without pipes, dash-split and skip numeric
/// prefixes and descriptor words.
fn pick_name(
    working: &str,
    want_brand: bool,
    strain: &mut Option<StrainType>,
    weight: &mut Option<Weight>,
) -> (String, Option<String>) {
    let segments: Vec<&str> = working
        .split('|')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();

    if segments.len() >= 2 {
        let mut brand = None;
        if want_brand {
            let first = segments[0];
            if !is_weight_descriptor(first) && !PURE_NUMERIC.is_match(first) {
                brand = Some(first.to_string());
            }
        }

        for middle in &segments[1..segments.len() - 1] {
            if strain.is_none() {
                if let Some(caps) = STRAIN_WORD.captures(middle) {
                    *strain = Some(map_strain(&caps[1]));
                }
            }
            if weight.is_none() {
                let (found, _) = extract_weight(middle);
                *weight = found;
            }
        }

        let last = segments[segments.len() - 1];
        if is_weight_descriptor(last) {
            let fallback = segments
                .iter()
                .find(|s| !is_weight_descriptor(s) && !is_descriptor_word(s))
                .copied()
                .unwrap_or(last);
            return (fallback.to_string(), brand);
        }
        return (last.to_string(), brand);
    }

    if let Some(only) = segments.first() {
        let dash_segments: Vec<&str> = split_dashes(only);
        if dash_segments.len() >= 2 {
            for candidate in &dash_segments {
                if !PURE_NUMERIC.is_match(candidate.trim()) && !is_descriptor_word(candidate) {
                    return (candidate.trim().to_string(), None);
                }
            }
        }
        return (only.to_string(), None);
    }

    (String::new(), None)
}

/// Split on spaced dashes only, so hyphenated names ("Pre-Roll",
/// "Gorilla-Glue") stay whole.
fn split_dashes(s: &str) -> Vec<&str> {
    static DASH: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+[-–]\s+").unwrap());
    DASH.split(s).map(str::trim).filter(|p| !p.is_empty()).collect()
}

static CONSECUTIVE_DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d{3,}").unwrap());

fn score_confidence(
    name: &str,
    thc: Option<f64>,
    weight: Option<&Weight>,
    strain: Option<StrainType>,
) -> f64 {
    let mut confidence: f64 = 1.0;
    if name.len() > 40 {
        confidence -= 0.2;
    }
    if thc.is_none() && weight.is_none() {
        confidence -= 0.1;
    }
    if strain.is_none() {
        confidence -= 0.1;
    }
    if name.len() < 3 {
        confidence -= 0.3;
    }
    if CONSECUTIVE_DIGITS.is_match(name) {
        confidence -= 0.2;
    }
    confidence.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn normalize_name(raw: &str, brand: Option<&str>) -> NormalizedProduct {
        normalize(&NormalizeInput {
            raw_name: raw,
            raw_brand: brand,
            ..Default::default()
        })
    }

    #[test]
    fn concatenated_card_with_brand_echo_and_strain_suffix() {
        let result = normalize_name(
            "Grocery | 28g Flower - Sativa | Black DieselGrocerySativaTHC: 29.21%",
            Some("Grocery"),
        );
        assert_eq!(result.name, "Black Diesel");
        assert_eq!(result.brand.as_deref(), Some("Grocery"));
        assert_eq!(result.strain, Some(StrainType::Sativa));
        assert_eq!(result.category, Category::Flower);
        assert_eq!(
            result.weight,
            Some(Weight { amount: 28.0, unit: WeightUnit::G })
        );
        assert_eq!(result.thc, Some(29.21));
        assert!((result.confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn marketing_tags_are_extracted_and_stripped() {
        let result = normalize_name("Staff Pick Blue Dream 3.5g Flower", None);
        assert!(result.tags.contains(&"staff pick".to_string()));
        assert!(!result.name.to_lowercase().contains("staff"));
        assert_eq!(
            result.weight,
            Some(Weight { amount: 3.5, unit: WeightUnit::G })
        );
    }

    #[test]
    fn percentage_fallback_comes_from_raw_fields() {
        let result = normalize(&NormalizeInput {
            raw_name: "Wedding Cake 1g Cart",
            raw_thc: Some("84.5%"),
            raw_cbd: Some("0.3"),
            ..Default::default()
        });
        assert_eq!(result.thc, Some(84.5));
        assert_eq!(result.cbd, Some(0.3));
        assert_eq!(result.category, Category::Vape);
    }

    #[test]
    fn tac_is_parsed_separately_from_thc() {
        let result = normalize_name("Sour Diesel TAC: 31.2% THC: 27.8%", None);
        assert_eq!(result.tac, Some(31.2));
        assert_eq!(result.thc, Some(27.8));
    }

    #[test]
    fn strain_maps_compound_types_to_base() {
        assert_eq!(
            normalize_name("Jack Herer Sativa-Hybrid", None).strain,
            Some(StrainType::Sativa)
        );
        assert_eq!(
            normalize_name("Northern Lights Indica-Hybrid", None).strain,
            Some(StrainType::Indica)
        );
    }

    #[test]
    fn fraction_weights_convert_to_grams() {
        assert_eq!(
            normalize_name("GMO Cookies 1/8 oz", None).weight,
            Some(Weight { amount: 3.5, unit: WeightUnit::G })
        );
        assert_eq!(
            normalize_name("GMO Cookies quarter", None).weight,
            Some(Weight { amount: 7.0, unit: WeightUnit::G })
        );
        assert_eq!(
            normalize_name("GMO Cookies 1/2 oz", None).weight,
            Some(Weight { amount: 14.0, unit: WeightUnit::G })
        );
        assert_eq!(
            normalize_name("GMO Cookies 2 oz", None).weight,
            Some(Weight { amount: 56.0, unit: WeightUnit::G })
        );
    }

    #[test]
    fn pack_and_piece_weights_keep_their_units() {
        assert_eq!(
            normalize_name("Mini Joints 5 pack", None).weight,
            Some(Weight { amount: 5.0, unit: WeightUnit::Pack })
        );
        assert_eq!(
            normalize_name("Fruit Chews 10 piece", None).weight,
            Some(Weight { amount: 10.0, unit: WeightUnit::Piece })
        );
    }

    #[test]
    fn thc_mg_dosage_is_not_a_weight() {
        let result = normalize_name("Sour Gummies THC: 100mg", None);
        assert_eq!(result.weight, None);

        let result = normalize_name("Sour Gummies 200mg", None);
        assert_eq!(
            result.weight,
            Some(Weight { amount: 200.0, unit: WeightUnit::Mg })
        );
    }

    #[test]
    fn category_prefers_raw_category_over_name() {
        let result = normalize(&NormalizeInput {
            raw_name: "Blue Dream",
            raw_category: Some("Pre-Rolls"),
            ..Default::default()
        });
        assert_eq!(result.category, Category::PreRoll);
    }

    #[test]
    fn category_falls_back_to_other() {
        assert_eq!(normalize_name("Mystery Item", None).category, Category::Other);
    }

    #[test]
    fn weight_only_last_segment_falls_back_to_first_meaningful() {
        let result = normalize_name("Purple Punch | 3.5g", None);
        assert_eq!(result.name, "Purple Punch");
    }

    #[test]
    fn dash_split_skips_numeric_prefix_and_descriptors() {
        let result = normalize_name("420 - Premium - OG Kush", None);
        assert_eq!(result.name, "OG Kush");
    }

    #[test]
    fn hyphenated_names_survive_dash_splitting() {
        let result = normalize_name("Gorilla-Glue", None);
        assert_eq!(result.name, "Gorilla-Glue");
    }

    #[test]
    fn missing_brand_is_taken_from_first_segment() {
        let result = normalize_name("Raw Garden | Live Resin 1g | Slurricane", None);
        assert_eq!(result.brand.as_deref(), Some("Raw Garden"));
        assert_eq!(result.name, "Slurricane");
        assert_eq!(result.category, Category::Concentrate);
    }

    #[test]
    fn confidence_penalizes_missing_signals() {
        // No THC, no weight, no strain.
        let result = normalize_name("Mystery Item", None);
        assert!((result.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn confidence_penalizes_digit_runs_and_short_names() {
        let result = normalize_name("SKU1234567", None);
        // Digit run (-0.2), no thc/weight (-0.1), no strain (-0.1).
        assert!((result.confidence - 0.6).abs() < 1e-9);

        let short = normalize_name("A", None);
        assert!(short.confidence <= 0.5);
    }

    #[test]
    fn normalizer_is_idempotent_on_its_own_output() {
        let inputs = [
            "Grocery | 28g Flower - Sativa | Black DieselGrocerySativaTHC: 29.21%",
            "Staff Pick Blue Dream 3.5g Flower",
            "Raw Garden | Live Resin 1g | Slurricane",
        ];
        for raw in inputs {
            let once = normalize_name(raw, None);
            let twice = normalize_name(&once.name, None);
            assert_eq!(once.name.trim(), twice.name.trim(), "input: {raw}");
        }
    }

    #[test]
    fn normalize_key_collapses_to_hyphens() {
        assert_eq!(normalize_key("Raw Garden"), "raw-garden");
        assert_eq!(normalize_key("  Grocery  "), "grocery");
        assert_eq!(normalize_key("Mac & Cheese #1"), "mac-cheese-1");
    }
}
