use anyhow::Result;

/// A chat model that turns a fully assembled prompt into an answer
#[allow(async_fn_in_trait)]
pub trait Generator {
    async fn generate(&self, prompt: &str) -> Result<String>;

    fn model_name(&self) -> &str;
}
