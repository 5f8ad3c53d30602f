use crate::models::prompt::PromptScene;

/// Longest repository detail passed into an article prompt.
pub const DETAIL_LIMIT: usize = 15_000;
/// Detail budget when a prior draft is also part of the prompt.
pub const REVISION_DETAIL_LIMIT: usize = 10_000;
/// README text passed to the detail prompt.
pub const README_LIMIT: usize = 10_000;
/// Detail text passed to the summary prompt.
pub const SUMMARY_INPUT_LIMIT: usize = 5_000;
/// Length of the plain summary derived from a README.
pub const PLAIN_SUMMARY_CHARS: usize = 300;

pub const ANALYSIS_SYSTEM_PROMPT: &str = r#"You are an experienced software analyst reviewing an open-source repository.
Describe what the project does from its metadata and README only. Be factual and
avoid superlatives such as "perfect" or "revolutionary" unless the README proves them.

You must respond with valid JSON matching this exact schema:
{
    "summary": "string, 2-4 sentences on what the project is and why it exists",
    "highlights": ["string, one notable capability per entry"],
    "tech_stack": ["string, e.g. 'Rust', 'React', 'PostgreSQL'"],
    "use_cases": ["string, one concrete scenario per entry"],
    "audience": "string, who benefits most from the project"
}"#;

pub const WRITER_SYSTEM_PROMPT: &str = "You are a technical writer. Write accurate, well structured \
Markdown articles about software projects. Stay factual, keep a professional tone and avoid \
exaggeration.";

pub const ANALYST_SYSTEM_PROMPT: &str = "You are an expert software analyst. Your answers are \
logically rigorous, factually accurate and free of exaggeration. Focus on technical facts.";

/// Built-in templates inserted into empty scenes. The first entry of each
/// scene becomes its default.
pub const SEED_PROMPTS: &[(PromptScene, &str, &str)] = &[
    (
        PromptScene::ArticleGeneration,
        "Technical deep dive",
        "Write an in-depth technical article about the open-source project {name}. \
Explain the problem it solves, its architecture and core features, how to get started, \
and where it fits compared with alternatives. Use Markdown with a single top-level title.",
    ),
    (
        PromptScene::ArticleGeneration,
        "Beginner friendly introduction",
        "Write a friendly introduction to the open-source project {name} for readers who are \
new to the field. Avoid jargon where possible, explain key terms, and finish with a short \
\"how to try it\" section. Use Markdown with a single top-level title.",
    ),
    (
        PromptScene::ArticleGeneration,
        "News brief",
        "Write a short news-style post (under 600 words) announcing the open-source project \
{name}: what it is, who it is for, and the three most notable features. Use Markdown with a \
single top-level title.",
    ),
    (
        PromptScene::RepoDetail,
        "README walkthrough",
        "Read the following README and explain in detail what the project does and what its \
core features are. Answer in Markdown. Stay factual.\n\nREADME:\n\n{content}",
    ),
    (
        PromptScene::RepoSummary,
        "One-line summary",
        "Summarize the following project description in at most 50 words of plain text. \
Stay factual.\n\n{detail}",
    ),
];

/// Substitutes `{name}`, `{content}` and `{detail}` placeholders in one
/// left-to-right pass. Substituted text is never scanned again.
pub fn render(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        let slot = tail.find('}').and_then(|end| {
            let key = &tail[1..end];
            vars.iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| (end, *value))
        });
        match slot {
            Some((end, value)) => {
                out.push_str(value);
                rest = &tail[end + 1..];
            }
            None => {
                out.push('{');
                rest = &tail[1..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Article prompt from a template. Templates without a `{detail}` or
/// `{content}` placeholder get the project detail appended.
pub fn article_prompt(template: &str, name: &str, detail: &str) -> String {
    let detail = truncate_chars(detail, DETAIL_LIMIT);
    let has_slot = template.contains("{detail}") || template.contains("{content}");
    let rendered = render(
        template,
        &[("name", name), ("detail", detail), ("content", detail)],
    );
    if has_slot {
        rendered
    } else {
        format!(
            "{}\n\nProject name: {}\n\nProject details:\n{}",
            rendered, name, detail
        )
    }
}

pub fn revision_prompt(previous: &str, suggestions: &str, detail: &str) -> String {
    format!(
        "You are a professional editor. Revise the existing article below according to the \
feedback. Output the complete revised article in Markdown.\n\n\
Existing article:\n{}\n\n\
Project details:\n{}\n\n\
Feedback:\n{}",
        previous,
        truncate_chars(detail, REVISION_DETAIL_LIMIT),
        suggestions
    )
}

pub fn analysis_prompt(
    full_name: &str,
    description: Option<&str>,
    language: Option<&str>,
    stars: u32,
    readme: Option<&str>,
) -> String {
    let mut prompt = format!("Analyze the repository '{}'", full_name);
    if let Some(desc) = description.filter(|d| !d.is_empty()) {
        prompt.push_str(&format!(" ({})", desc));
    }
    prompt.push_str(".\n\n");
    if let Some(language) = language {
        prompt.push_str(&format!("Primary language: {}\n", language));
    }
    prompt.push_str(&format!("Stars: {}\n", stars));
    match readme {
        Some(readme) if !readme.trim().is_empty() => {
            prompt.push_str("\nREADME:\n");
            prompt.push_str(truncate_chars(readme, README_LIMIT));
        }
        _ => prompt.push_str("\nNo README is available; rely on the metadata above.\n"),
    }
    prompt
}

/// Prefix of `text` holding at most `max` characters.
pub fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Plain-text summary of a README: badges, images, HTML and heading markers
/// are dropped and whitespace is collapsed.
pub fn plain_summary(readme: &str) -> String {
    let text = readme
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty()
                && !line.starts_with("[![")
                && !line.starts_with("![")
                && !line.starts_with('<')
                && !line.starts_with("```")
                && !line.contains("shields.io")
        })
        .map(|line| line.trim_start_matches('#').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    truncate_chars(&collapsed, PLAIN_SUMMARY_CHARS).to_string()
}
