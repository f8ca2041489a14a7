use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use segment_compiler::{CompileResult, CompilerConfig, SqlCompiler};

/// 未指定 --config 时尝试加载的配置文件
const DEFAULT_CONFIG_FILE: &str = "segment_compiler.json";
const ENV_LOG: &str = "SEGMENT_COMPILER_LOG";

/// 分群过滤树到 SQL 的编译器
#[derive(Debug, Parser)]
#[command(name = "segment-compiler", version)]
struct Cli {
    /// JSON 配置文件路径
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 编译一个 JSON 过滤树文件后退出
    #[arg(short, long)]
    tree: Option<PathBuf>,
}

fn init_logging() {
    let filter = std::env::var(ENV_LOG)
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_target(false)
        .compact()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// 创建SQL编译器实例，优先使用JSON配置，失败时使用默认配置
fn create_compiler(path: Option<&Path>) -> Result<SqlCompiler> {
    let config = match path {
        Some(path) => CompilerConfig::from_json_file(path)
            .with_context(|| format!("无法加载配置文件 {}", path.display()))?,
        None => match CompilerConfig::from_json_file(DEFAULT_CONFIG_FILE) {
            Ok(config) => {
                tracing::info!("使用JSON配置文件: {}", DEFAULT_CONFIG_FILE);
                config
            }
            Err(e) => {
                tracing::warn!("无法加载JSON配置文件 ({}), 使用默认配置", e);
                CompilerConfig::default()
            }
        },
    };
    Ok(SqlCompiler::from_config(config)?)
}

fn print_result(result: &CompileResult) {
    println!("{}", result.sql);
    for (i, arg) in result.args.iter().enumerate() {
        println!("  ${} = {:?}", i + 1, arg);
    }
}

fn run_repl(compiler: &SqlCompiler) -> Result<()> {
    println!("--- Segment Compiler: 过滤树到 SQL ---");
    println!("每行输入一个 JSON 过滤树, 输入 :quit 退出");

    let mut editor = DefaultEditor::new().context("无法初始化命令行编辑器")?;
    loop {
        match editor.readline("segment> ") {
            Ok(line) => {
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == ":quit" || line == ":q" {
                    break;
                }
                editor.add_history_entry(line)?;
                match compiler.compile_json(line) {
                    Ok(result) => print_result(&result),
                    Err(e) => println!("✗ 编译失败: {}", e),
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging();

    let compiler = create_compiler(cli.config.as_deref())?;

    match cli.tree {
        Some(path) => {
            let json = fs::read_to_string(&path)
                .with_context(|| format!("无法读取过滤树文件 {}", path.display()))?;
            let result = compiler
                .compile_json(&json)
                .with_context(|| format!("无法编译过滤树 {}", path.display()))?;
            print_result(&result);
            Ok(())
        }
        None => run_repl(&compiler),
    }
}
