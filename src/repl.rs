//! Interactive chat session.
//!
//! Plain lines are chat turns; `:`-prefixed lines are session commands
//! (folder browsing, reads, saves, speech). The storage gateway is built
//! lazily on the first command that needs it, so a missing credential file
//! blocks storage features only; chat and local reads keep working.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt};

use crate::chat::{system_instruction, CompletionProvider};
use crate::config::Config;
use crate::drive::{DriveGateway, StorageGateway};
use crate::ingest;
use crate::progress::ReadProgressReporter;
use crate::render::{render_docx, SaveNamer};
use crate::session::SessionState;
use crate::speech;
use crate::walker;

const HELP: &str = "\
Commands:
  :folders            list all folders under the configured root
  :use <n|id|root>    select the working folder (by list position or id)
  :files [deep]       list files in the working folder
  :read [deep] [limit N]   read listed files into the context
  :add <path>... [archive] read local files/directories into the context
  :listen <file>      transcribe an audio file and send it as your message
  :save [upload]      save the last reply as DOCX (optionally upload it)
  :speak [file]       synthesize the last reply to a WAV file
  :context            show which documents are in the context
  :reset              clear the ingested context
  :help               this help
  :quit               exit";

pub struct Repl {
    config: Config,
    state: SessionState,
    provider: Box<dyn CompletionProvider>,
    progress: Box<dyn ReadProgressReporter>,
    namer: SaveNamer,
    gateway: Option<DriveGateway>,
}

impl Repl {
    pub fn new(
        config: Config,
        provider: Box<dyn CompletionProvider>,
        progress: Box<dyn ReadProgressReporter>,
        folder: Option<String>,
    ) -> Self {
        let mut state = SessionState::new(&config);
        if let Some(id) = folder {
            state.select_folder_id(&id);
        }
        let namer = SaveNamer::new(&config.render.base_name);
        Self {
            config,
            state,
            provider,
            progress,
            namer,
            gateway: None,
        }
    }

    /// Runs a single turn and returns the reply (used by `chat --message`).
    pub async fn one_shot(&mut self, message: &str) -> Result<String> {
        self.state.push_user(message.to_string());
        let system = system_instruction(&self.state.ledger);
        let reply = self.provider.complete(&system, self.state.history()).await?;
        self.state.push_assistant(reply.clone());
        Ok(reply)
    }

    /// The interactive loop. Returns when the user quits or stdin closes.
    pub async fn run(&mut self) -> Result<()> {
        println!(
            "askdrive — working folder: {}. Type :help for commands.",
            self.state.working_folder_label()
        );

        let stdin = tokio::io::BufReader::new(tokio::io::stdin());
        let mut lines = stdin.lines();
        let mut stdout = tokio::io::stdout();

        loop {
            stdout.write_all(b"> ").await?;
            stdout.flush().await?;

            let line = match lines.next_line().await? {
                Some(line) => line,
                None => break,
            };
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(command) = line.strip_prefix(':') {
                if !self.handle_command(command).await? {
                    break;
                }
            } else {
                self.chat_turn(line.to_string()).await;
            }
        }
        Ok(())
    }

    /// Runs one command; returns false to exit the loop.
    async fn handle_command(&mut self, command: &str) -> Result<bool> {
        let mut words = command.split_whitespace();
        let verb = words.next().unwrap_or("");
        let args: Vec<&str> = words.collect();

        match verb {
            "quit" | "q" | "exit" => return Ok(false),
            "help" => println!("{}", HELP),
            "folders" => self.cmd_folders().await,
            "use" => self.cmd_use(&args),
            "files" => self.cmd_files(args.contains(&"deep")).await,
            "read" => self.cmd_read(&args).await,
            "add" => self.cmd_add(&args).await,
            "listen" => self.cmd_listen(&args).await,
            "save" => self.cmd_save(args.contains(&"upload")).await,
            "speak" => self.cmd_speak(args.first().copied()).await,
            "context" => self.cmd_context(),
            "reset" => {
                self.state.ledger.reset();
                println!("context cleared");
            }
            other => println!("unknown command ':{}' (try :help)", other),
        }
        Ok(true)
    }

    async fn chat_turn(&mut self, message: String) {
        self.state.push_user(message);
        let system = system_instruction(&self.state.ledger);
        match self.provider.complete(&system, self.state.history()).await {
            Ok(reply) => {
                println!("{}", reply);
                self.state.push_assistant(reply);
            }
            // The user turn stays in history, so retry is just resending.
            Err(e) => eprintln!("error: completion failed: {}", e),
        }
    }

    /// Builds the gateway on first use; a missing credential fails only the
    /// command that needed storage. Returns false (after printing the
    /// error) when no gateway can be built.
    fn ensure_gateway(&mut self) -> bool {
        if self.gateway.is_some() {
            return true;
        }
        match DriveGateway::new(&self.config.drive) {
            Ok(gateway) => {
                self.gateway = Some(gateway);
                true
            }
            Err(e) => {
                eprintln!("error: {}", e);
                false
            }
        }
    }

    async fn cmd_folders(&mut self) {
        let root_id = self.config.drive.root_folder_id.clone();
        let max_depth = self.config.drive.max_depth;
        if !self.ensure_gateway() {
            return;
        }
        let Some(gateway) = self.gateway.as_ref() else {
            return;
        };
        let listing = walker::list_folders(gateway, &root_id, max_depth).await;
        if listing.failed_branches > 0 {
            eprintln!(
                "warning: {} folder branch(es) could not be listed; results are partial",
                listing.failed_branches
            );
        }
        println!("  0. {}", crate::session::ROOT_FOLDER_LABEL);
        for (i, folder) in listing.folders.iter().enumerate() {
            println!("  {}. {}", i + 1, folder.display_label);
        }
        self.state.cache_folders(listing);
    }

    fn cmd_use(&mut self, args: &[&str]) {
        let Some(target) = args.first() else {
            println!("usage: :use <n|id|root>");
            return;
        };
        if *target == "root" || *target == "0" {
            self.state.select_root();
        } else if let Ok(index) = target.parse::<usize>() {
            let Some(folder) = self
                .state
                .cached_folders()
                .and_then(|l| l.folders.get(index - 1))
                .cloned()
            else {
                println!("no folder {} in the last :folders listing", index);
                return;
            };
            self.state.select_folder(&folder);
        } else {
            self.state.select_folder_id(target);
        }
        println!("working folder: {}", self.state.working_folder_label());
    }

    async fn cmd_files(&mut self, deep: bool) {
        let config = self.config.clone();
        if !self.ensure_gateway() {
            return;
        }
        let Some(gateway) = self.gateway.as_ref() else {
            return;
        };
        let listing = match ingest::discover_files(gateway, &mut self.state, &config, deep).await {
            Ok(listing) => listing,
            Err(e) => {
                eprintln!("error: {}", e);
                return;
            }
        };
        if listing.failed_branches > 0 {
            eprintln!(
                "warning: {} folder branch(es) could not be listed; results are partial",
                listing.failed_branches
            );
        }
        if listing.files.is_empty() {
            println!("no files found");
            return;
        }
        for file in &listing.files {
            let marker = if self.state.ledger.contains(&file.name) {
                "*"
            } else {
                " "
            };
            println!("  {} {}", marker, file.name);
        }
        println!("  ({} files; * already in context)", listing.files.len());
    }

    async fn cmd_read(&mut self, args: &[&str]) {
        let deep = args.contains(&"deep");
        let limit = args
            .iter()
            .position(|a| *a == "limit")
            .and_then(|i| args.get(i + 1))
            .and_then(|n| n.parse::<usize>().ok());

        let config = self.config.clone();
        if !self.ensure_gateway() {
            return;
        }
        let Some(gateway) = self.gateway.as_ref() else {
            return;
        };
        match ingest::read_remote(
            gateway,
            &mut self.state,
            &config,
            deep,
            limit,
            self.progress.as_ref(),
        )
        .await
        {
            Ok(report) => ingest::print_report(&report),
            Err(e) => eprintln!("error: {}", e),
        }
    }

    async fn cmd_add(&mut self, args: &[&str]) {
        let archive = args.contains(&"archive");
        let paths: Vec<PathBuf> = args
            .iter()
            .filter(|a| **a != "archive")
            .map(PathBuf::from)
            .collect();
        if paths.is_empty() {
            println!("usage: :add <path>... [archive]");
            return;
        }

        let config = self.config.clone();
        if archive && !self.ensure_gateway() {
            return;
        }
        let gateway = if archive {
            self.gateway.as_ref().map(|g| g as &dyn StorageGateway)
        } else {
            None
        };
        match ingest::read_local(
            &paths,
            &mut self.state,
            &config,
            gateway,
            self.progress.as_ref(),
        )
        .await
        {
            Ok(report) => ingest::print_report(&report),
            Err(e) => eprintln!("error: {}", e),
        }
    }

    async fn cmd_listen(&mut self, args: &[&str]) {
        let Some(path) = args.first() else {
            println!("usage: :listen <audio file>");
            return;
        };
        let Some(mime) = speech::audio_mime(path) else {
            println!("unsupported audio format: {}", path);
            return;
        };
        let audio = match std::fs::read(path) {
            Ok(audio) => audio,
            Err(e) => {
                eprintln!("error: reading '{}' failed: {}", path, e);
                return;
            }
        };
        match speech::transcribe(&self.config.speech, &audio, mime).await {
            Ok(text) if !text.is_empty() => {
                println!("you (transcribed): {}", text);
                self.chat_turn(text).await;
            }
            Ok(_) => println!("nothing transcribed; type your message instead"),
            Err(e) => {
                // Degrade to manual entry; never fatal.
                eprintln!("warning: transcription failed: {}", e);
                println!("type your message instead");
            }
        }
    }

    async fn cmd_save(&mut self, upload: bool) {
        let Some(reply) = self.state.last_assistant().map(|s| s.to_string()) else {
            println!("nothing to save yet");
            return;
        };
        let bytes = match render_docx("Assistant Reply", &reply) {
            Ok(bytes) => bytes,
            Err(e) => {
                eprintln!("error: rendering failed: {}", e);
                return;
            }
        };
        let name = self.namer.next("docx");

        let out_dir = self.config.render.output_dir.clone();
        let folder_id = self.state.working_folder_id().to_string();
        if upload {
            // A missing credential blocks only the upload, never the save.
            self.ensure_gateway();
        }
        let upload_to = if upload {
            self.gateway
                .as_ref()
                .map(|g| (g as &dyn StorageGateway, folder_id.as_str()))
        } else {
            None
        };
        persist_rendering(&bytes, &name, &out_dir, upload_to).await;
    }

    async fn cmd_speak(&mut self, out: Option<&str>) {
        let Some(reply) = self.state.last_assistant().map(|s| s.to_string()) else {
            println!("nothing to speak yet");
            return;
        };
        let wav = match speech::synthesize(&self.config.speech, &reply).await {
            Ok(wav) => wav,
            Err(e) => {
                eprintln!("warning: synthesis failed: {}", e);
                return;
            }
        };

        let path = match out {
            Some(path) => PathBuf::from(path),
            None => {
                let out_dir = &self.config.render.output_dir;
                if let Err(e) = std::fs::create_dir_all(out_dir) {
                    eprintln!("error: creating {} failed: {}", out_dir.display(), e);
                    return;
                }
                out_dir.join(self.namer.next("wav"))
            }
        };
        match std::fs::write(&path, &wav) {
            Ok(()) => println!("wrote {}", path.display()),
            Err(e) => eprintln!("error: writing {} failed: {}", path.display(), e),
        }
    }

    fn cmd_context(&self) {
        if self.state.ledger.is_empty() {
            println!("context is empty");
            return;
        }
        for block in self.state.ledger.blocks() {
            println!(
                "  {} ({} chars)",
                block.name,
                block.text.chars().count()
            );
        }
        println!("  ({} documents)", self.state.ledger.len());
    }
}

/// Writes a rendering to disk and, when requested, uploads it. The two
/// outcomes are independent: a failed local write still attempts the
/// upload, and a failed upload never undoes the local save.
async fn persist_rendering(
    bytes: &[u8],
    name: &str,
    out_dir: &Path,
    upload_to: Option<(&dyn StorageGateway, &str)>,
) {
    let path = out_dir.join(name);
    match std::fs::create_dir_all(out_dir).and_then(|()| std::fs::write(&path, bytes)) {
        Ok(()) => println!("saved {}", path.display()),
        Err(e) => eprintln!("error: writing {} failed: {}", path.display(), e),
    }

    if let Some((gateway, folder_id)) = upload_to {
        match gateway.upload(bytes.to_vec(), name, folder_id).await {
            Ok(id) => println!("uploaded {} (id {})", name, id),
            Err(e) => eprintln!("error: upload failed: {}", e),
        }
    }
}

/// Runs the interactive chat command.
pub async fn run_chat(
    config: Config,
    folder: Option<String>,
    message: Option<String>,
    progress: Box<dyn ReadProgressReporter>,
) -> Result<()> {
    let provider = Box::new(crate::chat::GeminiProvider::new(&config.chat)?);
    let mut repl = Repl::new(config, provider, progress, folder);

    match message {
        Some(message) => {
            let reply = repl
                .one_shot(&message)
                .await
                .context("Completion request failed")?;
            println!("{}", reply);
            Ok(())
        }
        None => repl.run().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DriveConfig, IngestConfig};
    use crate::models::{ChatRole, ChatTurn, DriveEntry};
    use crate::progress::NoProgress;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    fn test_config() -> Config {
        Config {
            drive: DriveConfig {
                credentials_path: "/nonexistent/token.json".into(),
                root_folder_id: "root".to_string(),
                max_depth: 10,
                include_globs: vec!["*".to_string()],
                exclude_globs: vec![],
            },
            chat: Default::default(),
            speech: Default::default(),
            ingest: IngestConfig { min_text_chars: 5 },
            render: Default::default(),
        }
    }

    struct FailingProvider;

    #[async_trait]
    impl CompletionProvider for FailingProvider {
        async fn complete(&self, _system: &str, _history: &[ChatTurn]) -> Result<String> {
            Err(anyhow!("model unavailable"))
        }
    }

    /// Fails the first call, answers every call after that.
    struct FlakyProvider {
        failed_once: AtomicBool,
    }

    #[async_trait]
    impl CompletionProvider for FlakyProvider {
        async fn complete(&self, _system: &str, history: &[ChatTurn]) -> Result<String> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(anyhow!("transient outage"));
            }
            Ok(format!("answered after {} turns", history.len()))
        }
    }

    #[tokio::test]
    async fn failed_completion_keeps_the_user_turn() {
        let mut repl = Repl::new(
            test_config(),
            Box::new(FailingProvider),
            Box::new(NoProgress),
            None,
        );

        repl.chat_turn("summarize the budget report".to_string()).await;

        let history = repl.state.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, ChatRole::User);
        assert_eq!(history[0].content, "summarize the budget report");
    }

    #[tokio::test]
    async fn resending_after_a_failure_completes_normally() {
        let mut repl = Repl::new(
            test_config(),
            Box::new(FlakyProvider {
                failed_once: AtomicBool::new(false),
            }),
            Box::new(NoProgress),
            None,
        );

        repl.chat_turn("what changed?".to_string()).await;
        repl.chat_turn("what changed?".to_string()).await;

        // The failed turn stays in history; the retry appends after it.
        let history = repl.state.history();
        assert_eq!(history.len(), 3);
        assert_eq!(history[0].role, ChatRole::User);
        assert_eq!(history[1].role, ChatRole::User);
        assert_eq!(history[2].role, ChatRole::Assistant);
        assert_eq!(history[2].content, "answered after 2 turns");
    }

    struct RecordingStore {
        uploads: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl StorageGateway for RecordingStore {
        async fn list_children(&self, _folder_id: &str) -> Result<Vec<DriveEntry>> {
            Ok(Vec::new())
        }
        async fn download(&self, _file_id: &str) -> Result<Vec<u8>> {
            Err(anyhow!("not a download target"))
        }
        async fn export(&self, _file_id: &str, _target_mime: &str) -> Result<Vec<u8>> {
            Err(anyhow!("not an export target"))
        }
        async fn upload(&self, _bytes: Vec<u8>, name: &str, _parent: &str) -> Result<String> {
            self.uploads.lock().unwrap().push(name.to_string());
            Ok("uploaded-id".to_string())
        }
    }

    #[tokio::test]
    async fn failed_local_save_still_attempts_the_upload() {
        // The output dir nests under a plain file, so create_dir_all fails.
        let blocker = tempfile::NamedTempFile::new().unwrap();
        let out_dir = blocker.path().join("out");
        let store = RecordingStore {
            uploads: Mutex::new(Vec::new()),
        };

        persist_rendering(b"rendered bytes", "reply.docx", &out_dir, Some((&store, "f1"))).await;

        assert_eq!(*store.uploads.lock().unwrap(), vec!["reply.docx".to_string()]);
    }

    #[tokio::test]
    async fn failed_upload_leaves_the_local_save_in_place() {
        struct RejectingStore;

        #[async_trait]
        impl StorageGateway for RejectingStore {
            async fn list_children(&self, _folder_id: &str) -> Result<Vec<DriveEntry>> {
                Ok(Vec::new())
            }
            async fn download(&self, _file_id: &str) -> Result<Vec<u8>> {
                Err(anyhow!("unused"))
            }
            async fn export(&self, _file_id: &str, _target_mime: &str) -> Result<Vec<u8>> {
                Err(anyhow!("unused"))
            }
            async fn upload(&self, _bytes: Vec<u8>, _name: &str, _parent: &str) -> Result<String> {
                Err(anyhow!("quota exceeded"))
            }
        }

        let out_dir = tempfile::tempdir().unwrap();
        persist_rendering(
            b"rendered bytes",
            "reply.docx",
            out_dir.path(),
            Some((&RejectingStore, "f1")),
        )
        .await;

        let saved = std::fs::read(out_dir.path().join("reply.docx")).unwrap();
        assert_eq!(saved, b"rendered bytes");
    }
}
