//! Built-in seed content so the service is usable without a content root.

use std::collections::HashMap;

use serde_json::json;

use crate::content::{MemoryContent, MemorySubject, MemorySubtopic};
use crate::domain::{
  Lesson, LessonEntry, Question, QuestionKind, QuizDefinition, SubjectConfig, SubjectInfo, SubtopicInfo, Video, VideoEntry,
};

fn tags(t: &[&str]) -> Vec<String> {
  t.iter().map(|s| s.to_string()).collect()
}

fn mc(text: &str, options: &[&str], answer_index: i64, t: &[&str]) -> Question {
  Question {
    kind: QuestionKind::MultipleChoice,
    text: text.into(),
    tags: tags(t),
    options: tags(options),
    answer_index: Some(answer_index),
    correct_answer: None,
    sample_solution: None,
  }
}

fn blank(text: &str, correct: &str, t: &[&str]) -> Question {
  Question {
    kind: QuestionKind::FillInTheBlank,
    text: text.into(),
    tags: tags(t),
    options: vec![],
    answer_index: None,
    correct_answer: Some(correct.into()),
    sample_solution: None,
  }
}

fn coding(text: &str, sample: &str, t: &[&str]) -> Question {
  Question {
    kind: QuestionKind::Coding,
    text: text.into(),
    tags: tags(t),
    options: vec![],
    answer_index: None,
    correct_answer: None,
    sample_solution: Some(sample.into()),
  }
}

fn lesson(id: &str, title: &str, t: &[&str], body: &str, video_id: Option<&str>) -> LessonEntry {
  LessonEntry {
    id: id.into(),
    lesson: Lesson {
      title: title.into(),
      tags: tags(t),
      content: vec![json!({ "type": "paragraph", "text": body })],
      video_id: video_id.map(str::to_string),
    },
  }
}

fn video(key: &str, title: &str, video_id: &str, description: &str) -> VideoEntry {
  VideoEntry {
    key: key.into(),
    video: Video { title: title.into(), video_id: video_id.into(), description: description.into() },
  }
}

/// A small "python" subject with `functions` and `loops` subtopics.
pub fn seed_content() -> MemoryContent {
  let config = SubjectConfig {
    allowed_keywords: tags(&[
      "python function basics",
      "function parameters",
      "return values",
      "scope",
      "for loops",
      "while loops",
      "loop control",
      "syntax",
    ]),
    subtopics: vec![
      ("functions".into(), SubtopicInfo { name: "Functions".into(), description: "Defining and calling functions".into(), order: 1 }),
      ("loops".into(), SubtopicInfo { name: "Loops".into(), description: "Repeating work with for and while".into(), order: 2 }),
    ],
  };

  let functions = MemorySubtopic {
    quiz: Some(QuizDefinition {
      title: "Python Functions Quiz".into(),
      questions: vec![
        mc("Which keyword defines a function?", &["func", "def", "lambda", "fn"], 1, &["python function basics", "syntax"]),
        blank("A function sends a value back to its caller with the ____ keyword.", "return", &["return values"]),
        mc(
          "What does a function return if it has no return statement?",
          &["0", "None", "False", "An error"],
          1,
          &["return values"],
        ),
        coding(
          "Write a function `add(a, b)` that returns the sum of its two parameters.",
          "def add(a, b):\n    return a + b",
          &["function parameters", "return values"],
        ),
      ],
    }),
    pool: vec![
      mc("How do you call a function named greet?", &["greet", "greet()", "call greet", "def greet()"], 1, &["python function basics"]),
      blank("Values listed in a function definition's parentheses are called ____.", "parameters, params", &["function parameters"]),
      mc(
        "Which of these returns two values?",
        &["return a, b", "return a; b", "return [a] [b]", "yield a b"],
        0,
        &["return values"],
      ),
      mc("Where is a variable assigned inside a function visible?", &["Everywhere", "Only inside that function", "Only in loops", "In other modules"], 1, &["scope"]),
      blank("The keyword to modify a module-level variable inside a function is ____.", "global", &["scope"]),
    ],
    lessons: vec![
      lesson("defining_functions", "Defining Functions", &["python function basics", "syntax"], "Use def, a name, parentheses and a colon.", Some("9Os0o3wzS_I")),
      lesson("parameters", "Parameters and Arguments", &["function parameters", "python function basics"], "Parameters name the inputs a function expects.", None),
      lesson("return_values", "Returning Values", &["return values", "python function basics"], "return ends the function and hands a value back.", None),
      lesson("scope", "Variable Scope", &["scope"], "Names assigned in a function are local to it.", None),
    ],
    videos: vec![video(
      "functions",
      "Python Functions Masterclass",
      "9Os0o3wzS_I",
      "Parameters, return values and scope.",
    )],
  };

  let loops = MemorySubtopic {
    quiz: Some(QuizDefinition {
      title: "Python Loops Quiz".into(),
      questions: vec![
        mc("How many times does `for i in range(3)` run?", &["2", "3", "4", "Forever"], 1, &["for loops"]),
        blank("The keyword that exits a loop immediately is ____.", "break", &["loop control"]),
        mc("Which loop runs while a condition stays true?", &["for", "while", "repeat", "until"], 1, &["while loops"]),
      ],
    }),
    pool: vec![
      mc("What does `continue` do?", &["Exits the loop", "Skips to the next iteration", "Restarts the program", "Nothing"], 1, &["loop control"]),
      mc("What does range(1, 4) produce?", &["1, 2, 3", "1, 2, 3, 4", "0, 1, 2, 3", "4"], 0, &["for loops"]),
      blank("A while loop whose condition never becomes false is an ____ loop.", "infinite", &["while loops"]),
    ],
    lessons: vec![
      lesson("for_loops", "For Loops", &["for loops", "syntax"], "for iterates over any iterable.", Some("94UHCEmprCY")),
      lesson("while_loops", "While Loops", &["while loops", "loop control"], "while repeats until its condition is false.", None),
    ],
    videos: vec![video(
      "loops",
      "Python Loops: For and While",
      "94UHCEmprCY",
      "Automate repetitive work with for and while loops.",
    )],
  };

  let mut subtopics = HashMap::new();
  subtopics.insert("functions".to_string(), functions);
  subtopics.insert("loops".to_string(), loops);

  let mut subjects = HashMap::new();
  let info = SubjectInfo {
    name: "Python Programming".into(),
    description: "Functions and loops, from first steps to remedial practice.".into(),
    icon: "fab fa-python".into(),
    color: "#3776ab".into(),
    status: "active".into(),
  };
  subjects.insert("python".to_string(), MemorySubject { config, info: Some(info), subtopics });
  MemoryContent::new(subjects)
}
