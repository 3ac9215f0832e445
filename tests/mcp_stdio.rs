use std::path::{Path, PathBuf};

use ragindex::{Chunk, HashEmbedder, VectorIndex};
use rmcp::{
    ServiceExt,
    model::CallToolRequestParams,
    transport::{ConfigureCommandExt, TokioChildProcess},
};
use serde_json::json;

fn setup_fixture(data_dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let chunks = vec![
        Chunk::new(
            "Welding requirements for steel pipes",
            "/docs/weld.txt",
            1,
            0,
        )?,
        Chunk::new("Banana bread recipe with walnuts", "/docs/bake.md", 1, 0)?,
    ];
    let mut embedder = HashEmbedder::default();
    let index = VectorIndex::build(chunks, &mut embedder, 8)?;
    index.persist(&data_dir.join("index"))?;
    Ok(())
}

#[tokio::test]
async fn mcp_stdio_retrieve_roundtrip() -> Result<(), Box<dyn std::error::Error>>
{
    let tempdir = tempfile::tempdir()?;
    setup_fixture(tempdir.path())?;

    let bin = ragindex_bin()?;
    let transport = TokioChildProcess::new(
        tokio::process::Command::new(bin).configure(|cmd| {
            cmd.arg("mcp")
                .env("RAGINDEX_DATA_DIR", tempdir.path())
                .env("RAGINDEX_FAKE_EMBEDDINGS", "1")
                .env("RAGINDEX_LOG", "warn")
                .env_remove("RAGINDEX_MODEL");
        }),
    )?;

    let client = ().serve(transport).await?;

    let tools = client.peer().list_all_tools().await?;
    assert!(tools.iter().any(|t| t.name == "ragindex_retrieve"));

    let args = json!({
        "query": "welding requirements",
        "topK": 3,
        "threshold": 0.45,
        "includeText": false
    });

    let result = client
        .peer()
        .call_tool(
            CallToolRequestParams::new("ragindex_retrieve")
                .with_arguments(args.as_object().unwrap().clone()),
        )
        .await?;

    let structured = result.structured_content.expect("structured content");
    let results = structured
        .get("results")
        .and_then(|v| v.as_array())
        .expect("results array");

    assert_eq!(results.len(), 1);
    assert_eq!(
        results[0].get("fileName").and_then(|v| v.as_str()),
        Some("weld.txt")
    );
    assert!(results[0].get("text").is_none());

    let citations = structured
        .get("citations")
        .and_then(|v| v.as_array())
        .expect("citations array");
    assert_eq!(citations.len(), 1);

    client.cancel().await?;
    Ok(())
}

fn ragindex_bin() -> Result<PathBuf, Box<dyn std::error::Error>> {
    if let Some(bin) = option_env!("CARGO_BIN_EXE_ragindex") {
        return Ok(PathBuf::from(bin));
    }

    let mut path = std::env::current_exe()?;
    path.pop();
    if path.ends_with("deps") {
        path.pop();
    }
    path.push("ragindex");

    if cfg!(windows) {
        path.set_extension("exe");
    }

    Ok(path)
}
