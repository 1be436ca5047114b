use crate::dao::models::{Quiz, QuizType};

/// Lowercase and strip every whitespace character, including full-width spaces.
fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_lowercase)
        .collect()
}

/// Judge a submitted answer against `quiz`.
pub fn is_correct(quiz: &Quiz, answer: &str) -> bool {
    match quiz.kind {
        QuizType::MultipleChoice => answer == quiz.correct_answer,
        QuizType::Input => {
            let submitted = normalize(answer);
            if submitted.is_empty() {
                return false;
            }
            std::iter::once(&quiz.correct_answer)
                .chain(&quiz.acceptable_answers)
                .any(|candidate| normalize(candidate) == submitted)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quiz(kind: QuizType, correct: &str, acceptable: &[&str]) -> Quiz {
        Quiz {
            quiz_id: "q1".into(),
            title: "Capitals".into(),
            question: "Capital of Japan?".into(),
            kind,
            choices: vec!["Tokyo".into(), "Osaka".into()],
            correct_answer: correct.into(),
            acceptable_answers: acceptable.iter().map(|s| (*s).into()).collect(),
            explanation: None,
            genre: "geography".into(),
        }
    }

    #[test]
    fn multiple_choice_requires_exact_match() {
        let quiz = quiz(QuizType::MultipleChoice, "Tokyo", &[]);
        assert!(is_correct(&quiz, "Tokyo"));
        assert!(!is_correct(&quiz, "tokyo"));
        assert!(!is_correct(&quiz, " Tokyo"));
    }

    #[test]
    fn input_ignores_case_and_whitespace() {
        let quiz = quiz(QuizType::Input, "New York", &[]);
        assert!(is_correct(&quiz, "newyork"));
        assert!(is_correct(&quiz, "  NEW\u{3000}york "));
        assert!(!is_correct(&quiz, "york"));
    }

    #[test]
    fn input_accepts_alternatives() {
        let quiz = quiz(QuizType::Input, "42", &["forty-two", "Forty Two"]);
        assert!(is_correct(&quiz, "FortyTwo"));
        assert!(is_correct(&quiz, "forty-two"));
        assert!(!is_correct(&quiz, "41"));
    }

    #[test]
    fn blank_input_is_never_correct() {
        let quiz = quiz(QuizType::Input, " ", &[]);
        assert!(!is_correct(&quiz, "   "));
    }
}
