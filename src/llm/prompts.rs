// Prompt templates for the recommendation requests. All builders are pure.

use crate::schema::{GuidanceEntry, NonConformity, Recommendation, RecommendationField};

pub const SYSTEM_PROMPT: &str = "Vous êtes un consultant expert en sécurité des aliments, \
spécialiste du référentiel IFS Food version 8. Vous aidez les sites audités à rédiger leur plan d'actions.";

const PREAMBLE: &str = "En tant qu'expert en IFS Food 8, fournissez des recommandations pour la \
correction immédiate, le type de preuve attendu et les actions correctives de la non-conformité suivante.";

const DETAILED_ANALYSIS: &str = "Appliquez une analyse détaillée, étape par étape (approche de type \
\"Chain of Thought\"), avant de rédiger chaque section.";

pub const CONTINUATION_PROMPT: &str = "Votre réponse précédente est incomplète. Continuez-la \
exactement là où elle s'est arrêtée, sans répéter ce qui a déjà été écrit, en conservant les titres \
de section demandés.";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PromptOptions {
    pub detailed_analysis: bool,
    pub structured_output: bool,
}

fn push_non_conformity(prompt: &mut String, nc: &NonConformity) {
    prompt.push_str(&format!("- Exigence : {}\n", nc.requirement_no));
    prompt.push_str(&format!("- Description : {}\n", nc.requirement_text));
    if let Some(score) = &nc.score {
        prompt.push_str(&format!("- Notation : {}\n", score));
    }
    prompt.push_str(&format!("- Constat détaillé : {}\n", nc.explanation));
}

fn push_guidance(prompt: &mut String, guidance: &GuidanceEntry) {
    prompt.push_str("\nSelon le guide IFS Food v8 pour cette exigence :\n");
    prompt.push_str(&format!("- Bonnes pratiques : {}\n", guidance.good_practice));
    prompt.push_str(&format!("- Éléments à vérifier : {}\n", guidance.elements_to_check));
    prompt.push_str(&format!(
        "- Exemple de question à poser : {}\n",
        guidance.example_questions
    ));
}

fn section_instructions() -> String {
    let mut block = String::from(
        "\nRédigez votre réponse en trois sections, dans cet ordre, en reprenant exactement ces titres \
         seuls sur leur ligne :\n",
    );
    for field in RecommendationField::ALL {
        block.push_str(field.marker());
        block.push('\n');
        block.push_str(match field {
            RecommendationField::Correction => "<la correction à mettre en place immédiatement>\n",
            RecommendationField::Evidence => "<les preuves documentaires à fournir>\n",
            RecommendationField::CorrectiveAction => {
                "<les actions correctives traitant la cause racine>\n"
            }
        });
    }
    block
}

fn structured_instructions() -> String {
    let schema = schemars::schema_for!(Recommendation);
    let schema_json = serde_json::to_string_pretty(&schema).unwrap_or_default();
    format!(
        "\nRépondez uniquement avec un objet JSON valide contenant les champs \
         \"correction\", \"evidence\" et \"corrective_action\", conforme à ce schéma :\n{}\n",
        schema_json
    )
}

/// Builds the prompt for one non-conformity.
///
/// Sections are always emitted in the same order: preamble, the finding, the
/// optional guidance, the optional detailed-analysis line, then the output
/// format instructions.
pub fn build_recommendation_prompt(
    nc: &NonConformity,
    guidance: Option<&GuidanceEntry>,
    options: PromptOptions,
) -> String {
    let mut prompt = String::from(PREAMBLE);
    prompt.push_str("\n\nVoici une non-conformité issue d'un audit IFS Food 8 :\n");
    push_non_conformity(&mut prompt, nc);

    if let Some(guidance) = guidance {
        push_guidance(&mut prompt, guidance);
    }

    if options.detailed_analysis {
        prompt.push('\n');
        prompt.push_str(DETAILED_ANALYSIS);
        prompt.push('\n');
    }

    if options.structured_output {
        prompt.push_str(&structured_instructions());
    } else {
        prompt.push_str(&section_instructions());
    }
    prompt
}

/// Builds one combined prompt for a whole action plan.
///
/// The answer is split back by paragraph blocks, so the model is asked for
/// exactly one block per non-conformity, separated by a blank line.
pub fn build_batch_prompt(
    items: &[(&NonConformity, Option<&GuidanceEntry>)],
    options: PromptOptions,
) -> String {
    let mut prompt = String::from(PREAMBLE);
    prompt.push_str(&format!(
        "\n\nVoici {} non-conformités issues d'un audit IFS Food 8.\n",
        items.len()
    ));

    for (i, (nc, guidance)) in items.iter().enumerate() {
        prompt.push_str(&format!("\n### Non-conformité {}\n", i + 1));
        push_non_conformity(&mut prompt, nc);
        if let Some(guidance) = guidance {
            push_guidance(&mut prompt, guidance);
        }
    }

    if options.detailed_analysis {
        prompt.push('\n');
        prompt.push_str(DETAILED_ANALYSIS);
        prompt.push('\n');
    }

    prompt.push_str(&format!(
        "\nRépondez avec exactement {} blocs, un par non-conformité et dans le même ordre. \
         Séparez les blocs par une ligne vide et n'insérez aucune ligne vide à l'intérieur d'un bloc.",
        items.len()
    ));
    prompt.push_str(&section_instructions());
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (NonConformity, GuidanceEntry) {
        (
            NonConformity::new("4.5", "Traceability gap", "No batch records found").with_score("C"),
            GuidanceEntry {
                requirement_id: "4.5.1".to_string(),
                good_practice: "Batch records kept".to_string(),
                elements_to_check: "Batch sheets".to_string(),
                example_questions: "How do you trace a lot?".to_string(),
            },
        )
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let (nc, guidance) = sample();
        let a = build_recommendation_prompt(&nc, Some(&guidance), PromptOptions::default());
        let b = build_recommendation_prompt(&nc, Some(&guidance), PromptOptions::default());
        assert_eq!(a, b);
    }

    #[test]
    fn test_prompt_section_order() {
        let (nc, guidance) = sample();
        let prompt = build_recommendation_prompt(&nc, Some(&guidance), PromptOptions::default());

        let finding = prompt.find("- Exigence : 4.5").unwrap();
        let explanation = prompt.find("No batch records found").unwrap();
        let guide = prompt.find("Batch records kept").unwrap();
        let correction = prompt.find("Correction immédiate").unwrap();
        let evidence = prompt.find("Preuves requises").unwrap();
        let actions = prompt.find("Actions Correctives").unwrap();

        assert!(prompt.starts_with(PREAMBLE));
        assert!(finding < explanation);
        assert!(explanation < guide);
        assert!(guide < correction);
        assert!(correction < evidence);
        assert!(evidence < actions);
        assert!(prompt.contains("- Notation : C"));
    }

    #[test]
    fn test_prompt_without_guidance() {
        let (nc, _) = sample();
        let prompt = build_recommendation_prompt(&nc, None, PromptOptions::default());
        assert!(!prompt.contains("Selon le guide"));
        assert!(prompt.contains("Preuves requises"));
    }

    #[test]
    fn test_detailed_analysis_and_structured_options() {
        let (nc, _) = sample();
        let prompt = build_recommendation_prompt(
            &nc,
            None,
            PromptOptions {
                detailed_analysis: true,
                structured_output: true,
            },
        );
        assert!(prompt.contains("Chain of Thought"));
        assert!(prompt.contains("\"corrective_action\""));
        assert!(!prompt.contains("seuls sur leur ligne"));
    }

    #[test]
    fn test_batch_prompt_numbers_items() {
        let (nc, guidance) = sample();
        let other = NonConformity::new("2.1.3", "Document control", "Obsolete SOP");
        let prompt = build_batch_prompt(
            &[(&nc, Some(&guidance)), (&other, None)],
            PromptOptions::default(),
        );
        assert!(prompt.contains("### Non-conformité 1"));
        assert!(prompt.contains("### Non-conformité 2"));
        assert!(prompt.contains("exactement 2 blocs"));
    }
}
