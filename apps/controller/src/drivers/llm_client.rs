// [apps/controller/src/drivers/llm_client.rs]
/*!
 * APARATO: LLM CLIENT CONTRACT
 * CLASIFICACIÓN: INFRASTRUCTURE ADAPTERS (ESTRATO L6)
 * RESPONSABILIDAD: FRONTERA DELGADA HACIA EL ANALIZADOR MULTIMODAL EXTERNO
 *
 * The concrete vendor (OpenAI, a local vision-language model, anything
 * else) is out of scope — this is the thin contract `LlmAnalysisModule`
 * calls once per triggered analysis. A real implementor speaks HTTP; this
 * trait only fixes the request/response shape it must present.
 */

use std::collections::VecDeque;
use std::sync::Mutex;

use aegis_domain_models::AnalysisResult;

/// One multimodal analysis request: the pending STT text, a downsampled
/// JPEG-encoded frame, and whether a person was present in the detector's
/// most recent pass — the `context_flag` spec.md §4.9 step 6 describes.
pub struct LlmAnalysisRequest {
    pub utterance_text: String,
    pub jpeg_image: Vec<u8>,
    pub has_person: bool,
}

pub trait LlmClient: Send + Sync {
    fn analyze(&self, request: LlmAnalysisRequest) -> anyhow::Result<AnalysisResult>;
}

/// A scripted client for tests and `test://`-style local runs: replays a
/// fixed queue of results, repeating the last one forever once exhausted.
/// Construct with [`ScriptedLlmClient::always_failing`] to exercise the
/// "not analyzed (error)" path instead.
pub struct ScriptedLlmClient {
    script: Mutex<VecDeque<AnalysisResult>>,
    last: Mutex<Option<AnalysisResult>>,
    failing: bool,
}

impl ScriptedLlmClient {
    pub fn new(results: Vec<AnalysisResult>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            last: Mutex::new(None),
            failing: false,
        }
    }

    pub fn always_failing() -> Self {
        Self {
            script: Mutex::new(VecDeque::new()),
            last: Mutex::new(None),
            failing: true,
        }
    }
}

impl LlmClient for ScriptedLlmClient {
    fn analyze(&self, _request: LlmAnalysisRequest) -> anyhow::Result<AnalysisResult> {
        if self.failing {
            anyhow::bail!("scripted llm client configured to fail");
        }
        let mut script = self.script.lock().unwrap();
        let next = script.pop_front();
        drop(script);
        let mut last = self.last.lock().unwrap();
        if let Some(next) = next {
            *last = Some(next);
        }
        last.clone().ok_or_else(|| anyhow::anyhow!("scripted llm client has no result queued"))
    }
}
