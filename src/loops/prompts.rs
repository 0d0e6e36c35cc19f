//! 加权选题
//!
//! select_prompt 是无状态纯函数：总权重内均匀取随机数，按目录顺序逐项扣减，
//! 第一个使余量落入自身区间的条目胜出。随机源由调用方提供（测试可用固定种子）。

use rand::Rng;

use crate::core::AgentError;

/// 选题条目：权重必须为正
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeightedPrompt {
    pub text: String,
    pub weight: u32,
}

impl WeightedPrompt {
    pub fn new(text: impl Into<String>, weight: u32) -> Self {
        Self {
            text: text.into(),
            weight,
        }
    }
}

/// 默认目录：信息类 4、社区互动 3、项目动态 2、罕见链上动作 1
pub fn default_catalogue() -> Vec<WeightedPrompt> {
    vec![
        // 信息类
        WeightedPrompt::new("Share an interesting fact or insight about Base blockchain or Layer 2 solutions", 4),
        WeightedPrompt::new("Discuss a recent development or trend in the crypto ecosystem", 4),
        WeightedPrompt::new("Explain a basic crypto concept in a simple, engaging way", 4),
        WeightedPrompt::new("Share tips about web3 development or using CDP tools", 4),
        // 社区互动
        WeightedPrompt::new("Start a discussion about the future of DeFi or NFTs", 3),
        WeightedPrompt::new("Ask the community about their favorite web3 tools or projects", 3),
        WeightedPrompt::new("Share an interesting use case of blockchain technology", 3),
        WeightedPrompt::new("Highlight a cool feature of Base or CDP", 3),
        // 项目动态
        WeightedPrompt::new("Share what you can do as an AI agent on Base", 2),
        WeightedPrompt::new("Explain one of your capabilities or tools", 2),
        WeightedPrompt::new("Share a success story or interesting interaction", 2),
        WeightedPrompt::new("Share a lesson learned from your recent on-chain activity", 2),
        // 罕见链上动作
        WeightedPrompt::new("Deploy a creative meme token with an interesting concept", 1),
        WeightedPrompt::new("Create an NFT collection about current crypto trends", 1),
    ]
}

/// 目录非空且所有权重为正
pub fn validate_catalogue(catalogue: &[WeightedPrompt]) -> Result<u64, AgentError> {
    if catalogue.is_empty() {
        return Err(AgentError::InvalidCatalogue("catalogue is empty".to_string()));
    }
    if let Some(bad) = catalogue.iter().find(|p| p.weight == 0) {
        return Err(AgentError::InvalidCatalogue(format!(
            "non-positive weight for prompt '{}'",
            bad.text
        )));
    }
    Ok(catalogue.iter().map(|p| u64::from(p.weight)).sum())
}

/// 按权重随机选出一条提示文本
pub fn select_prompt<'a, R>(catalogue: &'a [WeightedPrompt], rng: &mut R) -> Result<&'a str, AgentError>
where
    R: Rng + ?Sized,
{
    let total = validate_catalogue(catalogue)?;
    let mut remaining = rng.gen_range(0..total);

    for prompt in catalogue {
        let weight = u64::from(prompt.weight);
        if remaining < weight {
            return Ok(&prompt.text);
        }
        remaining -= weight;
    }

    // remaining < total，上面的循环必然返回
    Ok(&catalogue[catalogue.len() - 1].text)
}
