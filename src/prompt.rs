//! Grounded-answer prompt assembly.
//!
//! Pure string templating: the same query and retrieval results always
//! produce the same prompt. The template instructs the model to answer only
//! from the supplied context and to say so explicitly when the context is
//! not enough.

use crate::models::RetrievalHit;

/// Separator placed between context passages.
fn context_separator() -> String {
    "-".repeat(100)
}

/// Assemble the grounded-answer prompt from the query and up to
/// `max_results` retrieved passages.
pub fn build_prompt(query: &str, results: &[RetrievalHit], max_results: usize) -> String {
    let contexto: String = results
        .iter()
        .take(max_results)
        .map(|hit| format!("\n{}\n", hit.text))
        .collect::<Vec<_>>()
        .join(&context_separator());

    format!(
        "El usuario necesita que respondas la siguiente pregunta basandote solo en el contexto proporcionado.\n\
         Si la información en el contexto no es suficiente para responder, indícalo claramente.\n\
         \n\
         Usuario: {query}\n\
         \n\
         Contexto relevante:\n\
         {contexto}\n\
         \n\
         Respuesta:"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str, distance: f64) -> RetrievalHit {
        RetrievalHit {
            text: text.to_string(),
            distance,
        }
    }

    #[test]
    fn test_deterministic() {
        let results = vec![hit("ARCHIVO: roma.md\nvuelo y hotel", 0.3)];
        let a = build_prompt("¿Qué incluye el viaje a Roma?", &results, 5);
        let b = build_prompt("¿Qué incluye el viaje a Roma?", &results, 5);
        assert_eq!(a, b);
    }

    #[test]
    fn test_contains_query_and_context() {
        let results = vec![hit("ARCHIVO: roma.md\nIncluye vuelo", 0.2)];
        let prompt = build_prompt("¿Qué incluye el viaje a Roma?", &results, 5);
        assert!(prompt.contains("¿Qué incluye el viaje a Roma?"));
        assert!(prompt.contains("ARCHIVO: roma.md"));
        assert!(prompt.contains("no es suficiente"));
        assert!(prompt.ends_with("Respuesta:"));
    }

    #[test]
    fn test_truncates_to_max_results() {
        let results: Vec<RetrievalHit> = (0..8)
            .map(|i| hit(&format!("pasaje {}", i), 0.1 * i as f64))
            .collect();
        let prompt = build_prompt("pregunta", &results, 3);
        assert!(prompt.contains("pasaje 2"));
        assert!(!prompt.contains("pasaje 3"));
        // Two separators join three passages.
        assert_eq!(prompt.matches(&context_separator()).count(), 2);
    }

    #[test]
    fn test_empty_results_still_builds() {
        let prompt = build_prompt("pregunta", &[], 5);
        assert!(prompt.contains("Contexto relevante:"));
        assert!(prompt.contains("pregunta"));
    }
}
