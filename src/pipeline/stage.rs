use serde::Serialize;

/// One step of a repository pipeline run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum PipelineStage {
    Role,
    Analysis { index: usize, total: usize },
    Planning,
    Refactor,
    Review,
}

impl PipelineStage {
    /// The full ordered stage sequence for `chunk_count` chunks.
    pub fn sequence(chunk_count: usize) -> Vec<PipelineStage> {
        let mut stages = Vec::with_capacity(chunk_count + 4);
        stages.push(PipelineStage::Role);
        stages.extend((0..chunk_count).map(|index| PipelineStage::Analysis {
            index,
            total: chunk_count,
        }));
        stages.push(PipelineStage::Planning);
        stages.push(PipelineStage::Refactor);
        stages.push(PipelineStage::Review);
        stages
    }

    pub fn label(&self) -> String {
        match self {
            PipelineStage::Role => "Role".to_string(),
            PipelineStage::Analysis { index, total } => {
                format!("Analysis {}/{}", index + 1, total)
            }
            PipelineStage::Planning => "Planning".to_string(),
            PipelineStage::Refactor => "Refactor".to_string(),
            PipelineStage::Review => "Review".to_string(),
        }
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.label())
    }
}
