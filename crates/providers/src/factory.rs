use parley_core::config::ProviderConfig;
use parley_core::Config;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::{CapabilityProvider, OllamaProvider, RemoteProvider};

/// 支持的后端名字
pub const PROVIDER_NAMES: [&str; 2] = ["remote", "ollama"];

/// 统一的 provider 创建入口，按 `backend.provider` 选择后端。
///
/// - `remote` 缺少 api_key 时仍然创建（探测结果为 Unavailable），会话照常可用
/// - `ollama` 不需要 api_key
/// - 未知名字返回 Err
pub fn create_provider(config: &Config) -> anyhow::Result<Arc<dyn CapabilityProvider>> {
    let name = config.backend.provider.trim();
    if !PROVIDER_NAMES.contains(&name) {
        return Err(anyhow::anyhow!(
            "Unknown capability backend '{}'. Expected one of: {}",
            name,
            PROVIDER_NAMES.join(", ")
        ));
    }

    let empty_cfg = ProviderConfig::default();
    let resolved_cfg = config.providers.get(name).unwrap_or(&empty_cfg);

    // 代理参数：
    //   provider_proxy = providers.<name>.proxy（None=未配置，Some("")=强制直连）
    //   global_proxy   = network.proxy
    //   no_proxy       = network.noProxy
    let provider_proxy = resolved_cfg.proxy.as_deref();
    let global_proxy = config.network.proxy.as_deref();
    let no_proxy = &config.network.no_proxy;

    match name {
        "ollama" => {
            info!(model = %config.backend.model, "Using on-device Ollama backend");
            Ok(Arc::new(OllamaProvider::new_with_proxy(
                resolved_cfg.api_base.as_deref(),
                &config.backend.model,
                config.pipeline.languages.clone(),
                provider_proxy,
                global_proxy,
                no_proxy,
            )) as Arc<dyn CapabilityProvider>)
        }
        _ => {
            let provider = RemoteProvider::new_with_proxy(
                &resolved_cfg.api_key,
                resolved_cfg.api_base.as_deref(),
                config.pipeline.language_codes(),
                provider_proxy,
                global_proxy,
                no_proxy,
                Duration::from_secs(config.network.timeout_secs),
            );
            if provider.is_configured() {
                info!("Using remote capability backend");
            } else {
                warn!("Remote backend has no apiKey/apiBase; capabilities will report unavailable");
            }
            Ok(Arc::new(provider) as Arc<dyn CapabilityProvider>)
        }
    }
}
