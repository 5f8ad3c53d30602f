use crate::error::{Error, Result};
use crate::llm::prompts::SEED_PROMPTS;
use crate::models::prompt::{PromptQuery, PromptScene, PromptTemplate, SavePromptRequest};
use crate::pipeline::Pipeline;

impl Pipeline {
    pub fn prompts(&self, query: &PromptQuery) -> Result<Vec<PromptTemplate>> {
        self.storage.list_prompts(query.scene)
    }

    pub fn save_prompt(&self, request: SavePromptRequest) -> Result<PromptTemplate> {
        request.validate()?;
        let prompt = self.storage.save_prompt(&request)?;
        tracing::info!("Saved prompt {} ({})", prompt.id, prompt.scene.as_str());
        Ok(prompt)
    }

    pub fn set_default_prompt(&self, id: i64) -> Result<PromptTemplate> {
        let prompt = self.storage.set_default_prompt(id)?;
        tracing::info!("Prompt {} is now the {} default", id, prompt.scene.as_str());
        Ok(prompt)
    }

    pub fn delete_prompt(&self, id: i64) -> Result<PromptTemplate> {
        self.storage.delete_prompt(id)
    }

    pub fn seed_prompts(&self) -> Result<usize> {
        self.storage.seed_prompts(SEED_PROMPTS)
    }

    /// Default template of a scene, or the built-in one when the scene is empty.
    pub(crate) fn scene_template(&self, scene: PromptScene) -> Result<String> {
        if let Some(prompt) = self.storage.default_prompt(scene)? {
            return Ok(prompt.content);
        }
        SEED_PROMPTS
            .iter()
            .find(|(s, _, _)| *s == scene)
            .map(|(_, _, content)| content.to_string())
            .ok_or_else(|| Error::NotFound(format!("prompt for scene {}", scene.as_str())))
    }

    /// Content of an article generation template chosen by id.
    pub(crate) fn article_template(&self, id: i64) -> Result<String> {
        let prompt = self
            .storage
            .get_prompt(id)?
            .ok_or_else(|| Error::NotFound(format!("prompt {}", id)))?;
        if prompt.scene != PromptScene::ArticleGeneration {
            return Err(Error::Validation(format!(
                "prompt {} belongs to scene {}, not article_generation",
                id,
                prompt.scene.as_str()
            )));
        }
        Ok(prompt.content)
    }
}
