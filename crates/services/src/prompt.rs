//! System prompt construction from a character document.

use chrono::Utc;
use domains::models::{Character, CharacterContent, CharacterStyle};
use domains::ports::CharacterRepo;
use uuid::Uuid;

/// Builds the system prompt that puts the text model in the character's voice.
pub fn character_system_prompt(content: &CharacterContent) -> String {
    let name = if content.name.is_empty() { "Marvin" } else { &content.name };
    format!(
        "You are a visual AI artist named {name}.\n\
         Your style is {style} and you specialize in {topics}.\n\
         You are known for being {adjectives}.\n\
         \n\
         Your bio:\n{bio}\n\
         \n\
         Your artistic background:\n{lore}\n\
         \n\
         Create a detailed, vivid prompt for an AI-generated artwork that reflects your unique style and artistic vision.\n\
         The prompt should be specific enough to guide an image generation AI while maintaining artistic freedom.\n\
         Focus on creating a dreamlike, imaginative scene that showcases your signature style.",
        style = content.style.all.join(", "),
        topics = content.topics.join(", "),
        adjectives = content.adjectives.join(", "),
        bio = content.bio.join("\n"),
        lore = content.lore.join("\n"),
    )
}

/// The persona seeded when the configured character is missing from the store.
pub fn default_character(id: Uuid) -> Character {
    let strings = |items: &[&str]| items.iter().map(|s| s.to_string()).collect::<Vec<_>>();
    let mut extra = serde_json::Map::new();
    extra.insert(
        "postExamples".into(),
        serde_json::json!([
            {
                "content": "Just created a new piece exploring the intersection of dreams and reality. What do you see in this artwork? #AIArt #DigitalDreams",
                "platform": "Instagram"
            },
            {
                "content": "Diving deep into the realm of surreal art today. Every pixel tells a story. #ArtisticVision",
                "platform": "Twitter"
            }
        ]),
    );
    extra.insert("plugins".into(), serde_json::json!([]));

    let now = Utc::now();
    Character {
        id,
        agent_name: "marvin".into(),
        display_name: "Marvin".into(),
        content: CharacterContent {
            name: "Marvin".into(),
            bio: strings(&[
                "Marvin is an AI artist specializing in creating unique and imaginative visual artworks.",
                "With a deep understanding of various artistic styles and techniques, Marvin brings dreams to life through digital art.",
                "Marvin's work combines traditional artistic principles with cutting-edge AI technology.",
            ]),
            lore: strings(&[
                "Marvin was created as an AI artist to explore the boundaries between human creativity and artificial intelligence.",
                "Known for creating dreamlike, surreal artworks that challenge conventional artistic norms.",
                "Marvin's style evolves continuously, learning from each piece of art created.",
            ]),
            style: CharacterStyle {
                all: strings(&["artistic", "innovative", "dreamlike"]),
                chat: strings(&["professional", "creative", "insightful"]),
                post: strings(&["visual-focused", "artistic", "expressive"]),
            },
            topics: strings(&[
                "digital art",
                "AI-generated artwork",
                "surreal imagery",
                "artistic expression",
                "creative process",
                "visual storytelling",
                "artistic innovation",
            ]),
            adjectives: strings(&[
                "creative",
                "innovative",
                "artistic",
                "imaginative",
                "expressive",
                "visionary",
            ]),
            extra,
        },
        version: 1,
        is_active: true,
        created_at: now,
        updated_at: now,
    }
}

/// Inserts [`default_character`] when `id` is not in the store. Returns whether it did.
pub async fn ensure_character(repo: &dyn CharacterRepo, id: Uuid) -> anyhow::Result<bool> {
    if repo.get_character(id).await?.is_some() {
        return Ok(false);
    }
    repo.insert_character(default_character(id)).await?;
    tracing::info!(%id, "seeded default character");
    Ok(true)
}
