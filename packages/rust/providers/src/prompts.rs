//! Prompt templates sent to the text generation model.

use crate::{OutlineRequest, TheoryRequest};

/// Prompt asking for one topic's theory as Markdown.
pub(crate) fn theory_prompt(request: &TheoryRequest) -> String {
    let mut prompt = format!(
        "Write the lesson for the topic \"{title}\", part of the chapter \"{chapter}\".\n",
        title = request.title,
        chapter = request.chapter_title,
    );

    if !request.description.trim().is_empty() {
        prompt.push_str(&format!("Topic summary: {}\n", request.description.trim()));
    }

    prompt.push_str(&format!(
        "Write entirely in {language}.\n\
         Format the answer as Markdown: start with a single `#` heading naming the topic, \
         use `##` subheadings, short paragraphs, bullet lists and fenced code blocks \
         where examples help. Explain the idea, walk through a worked example and end \
         with a short summary. Do not add any text before the heading.",
        language = request.language,
    ));

    prompt
}

/// Prompt asking for a course outline as JSON.
pub(crate) fn outline_prompt(request: &OutlineRequest) -> String {
    format!(
        "Design a course on \"{subject}\" with exactly {count} chapters, written in {language}.\n\
         Each chapter has between 2 and 5 topics, ordered from basics to advanced.\n\
         Answer with JSON only, shaped as:\n\
         {{\"chapters\": [{{\"title\": \"...\", \"topics\": [{{\"title\": \"...\", \"description\": \"...\"}}]}}]}}",
        subject = request.subject,
        count = request.chapter_count,
        language = request.language,
    )
}
