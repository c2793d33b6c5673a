//! In-process SMB2 server for exercising the client over loopback TCP
//!
//! Serves an in-memory tree of files, verifies NTLMv2 responses, and can be
//! told to misbehave: refuse a handshake step, answer out of order, fail a
//! read, stay silent, or hang up.

use crate::auth::ntlm::{
    av_id, encode_av_pairs, NtlmAuthenticateMessage, NtlmChallengeMessage, NtlmMessageType,
    NTLMSSP_SIGNATURE,
};
use crate::auth::ntlm_crypto::{ntlmv2_hash, verify_ntlmv2_response, windows_timestamp};
use crate::client::directory::{encode_directory_information, DirEntry};
use crate::error::{Error, NtStatus, Result};
use crate::protocol::messages::{
    utf16le_encode, FileId, FileInfoClass, Smb2CloseRequest, Smb2CloseResponse,
    Smb2CreateRequest, Smb2CreateResponse, Smb2ErrorResponse, Smb2NegotiateRequest,
    Smb2NegotiateResponse, Smb2QueryDirectoryRequest, Smb2QueryDirectoryResponse,
    Smb2ReadRequest, Smb2ReadResponse, Smb2SessionSetupRequest, Smb2SessionSetupResponse,
    Smb2SetInfoRequest, Smb2SetInfoResponse, Smb2TreeConnectRequest, Smb2TreeConnectResponse,
    Smb2WriteRequest, Smb2WriteResponse, SmbMessage,
};
use crate::protocol::smb2_constants::{
    query_directory_flags, CreateDisposition, CreateOptions, FileAttributes, Smb2Command,
    Smb2Dialect,
};
use crate::protocol::{Message, Smb2Header};
use crate::transport::{self, FrameWriter};
use chrono::{TimeZone, Utc};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const SESSION_ID: u64 = 0x1234;
pub const TREE_ID: u32 = 7;
pub const SHARE: &str = "share";

/// How the server authenticates and misbehaves
#[derive(Debug, Clone)]
pub struct ServerOptions {
    pub username: String,
    pub password: String,
    pub max_read_size: u32,
    pub max_write_size: u32,
    /// Refuse the first SESSION_SETUP
    pub fail_session_setup: bool,
    /// Hold READ replies until this many are queued, then answer newest first
    pub reorder_reads: Option<usize>,
    /// Fail the READ starting at this offset
    pub fail_read_at: Option<u64>,
    /// Commands that are logged but never answered
    pub silent: Vec<Smb2Command>,
    /// Close the socket on receiving this command
    pub hang_up_on: Option<Smb2Command>,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            username: "alice".to_string(),
            password: "wonderland".to_string(),
            max_read_size: 65536,
            max_write_size: 65536,
            fail_session_setup: false,
            reorder_reads: None,
            fail_read_at: None,
            silent: Vec::new(),
            hang_up_on: None,
        }
    }
}

/// Everything a test may want to inspect after the fact
#[derive(Debug, Default)]
pub struct ServerState {
    pub files: BTreeMap<String, Vec<u8>>,
    pub dirs: BTreeSet<String>,
    /// Every request received, in arrival order
    pub log: Vec<Smb2Command>,
    /// (offset, length) of every WRITE
    pub writes: Vec<(u64, usize)>,
    /// Batches of READ replies that went out in a different order
    pub reordered_batches: usize,
    open: HashMap<u64, OpenHandle>,
    next_handle: u64,
}

#[derive(Debug)]
struct OpenHandle {
    path: String,
    listed: bool,
    delete_on_close: bool,
}

impl ServerState {
    fn exists(&self, path: &str) -> bool {
        self.files.contains_key(path) || self.dirs.contains(path)
    }

    fn children(&self, dir: &str) -> Vec<DirEntry> {
        let prefix = if dir.is_empty() {
            String::new()
        } else {
            format!("{}\\", dir)
        };
        let direct = |path: &String| {
            path.strip_prefix(&prefix)
                .filter(|rest| !rest.is_empty() && !rest.contains('\\'))
                .map(str::to_string)
        };

        let mut entries = vec![dot_entry("."), dot_entry("..")];
        entries.extend(self.dirs.iter().filter_map(&direct).map(|name| DirEntry {
            name,
            size: 0,
            last_write_time: None,
            attributes: FileAttributes::DIRECTORY,
        }));
        entries.extend(self.files.iter().filter_map(|(path, data)| {
            direct(path).map(|name| DirEntry {
                name,
                size: data.len() as u64,
                last_write_time: Utc.timestamp_opt(1_600_000_000, 0).single(),
                attributes: FileAttributes::ARCHIVE,
            })
        }));
        entries
    }

    pub fn count(&self, command: Smb2Command) -> usize {
        self.log.iter().filter(|c| **c == command).count()
    }
}

fn dot_entry(name: &str) -> DirEntry {
    DirEntry {
        name: name.to_string(),
        size: 0,
        last_write_time: None,
        attributes: FileAttributes::DIRECTORY,
    }
}

/// A listening fake server; stops when dropped
pub struct LoopbackServer {
    addr: SocketAddr,
    state: Arc<Mutex<ServerState>>,
    task: JoinHandle<()>,
}

impl LoopbackServer {
    pub async fn start(options: ServerOptions) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let mut initial = ServerState::default();
        initial.dirs.insert(String::new());
        let state = Arc::new(Mutex::new(initial));

        let shared = Arc::clone(&state);
        let task = tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let session = Session::new(options.clone(), Arc::clone(&shared));
                tokio::spawn(async move {
                    if let Err(e) = session.serve(stream).await {
                        tracing::debug!("Loopback session ended: {}", e);
                    }
                });
            }
        });

        Ok(Self { addr, state, task })
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn state(&self) -> std::sync::MutexGuard<'_, ServerState> {
        self.state.lock().unwrap()
    }

    pub fn add_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.state().files.insert(path.to_string(), data.into());
    }

    pub fn add_dir(&self, path: &str) {
        self.state().dirs.insert(path.to_string());
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.state().files.get(path).cloned()
    }

    pub fn count(&self, command: Smb2Command) -> usize {
        self.state().count(command)
    }
}

impl Drop for LoopbackServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

enum Reply {
    Now(Message),
    /// Queued for reordering; the flag marks the final packet of the file
    Held(Message, bool),
    Silent,
    HangUp,
}

/// One accepted connection
struct Session {
    options: ServerOptions,
    state: Arc<Mutex<ServerState>>,
    server_challenge: [u8; 8],
    held: Vec<Message>,
}

impl Session {
    fn new(options: ServerOptions, state: Arc<Mutex<ServerState>>) -> Self {
        Self {
            options,
            state,
            server_challenge: rand::random(),
            held: Vec::new(),
        }
    }

    async fn serve(mut self, stream: tokio::net::TcpStream) -> Result<()> {
        let (mut reader, mut writer) = transport::split(stream);
        loop {
            let requests = match reader.read_messages().await {
                Ok(requests) => requests,
                Err(Error::ConnectionClosed) => return Ok(()),
                Err(e) => return Err(e),
            };
            for request in requests {
                match self.handle(&request) {
                    Reply::Now(reply) => writer.send(&reply).await?,
                    Reply::Held(reply, last) => self.hold(reply, last, &mut writer).await?,
                    Reply::Silent => {}
                    Reply::HangUp => {
                        writer.shutdown().await?;
                        return Ok(());
                    }
                }
            }
        }
    }

    async fn hold(&mut self, reply: Message, last: bool, writer: &mut FrameWriter) -> Result<()> {
        self.held.push(reply);
        let limit = self.options.reorder_reads.unwrap_or(1);
        if self.held.len() < limit && !last {
            return Ok(());
        }
        if self.held.len() > 1 {
            self.state.lock().unwrap().reordered_batches += 1;
        }
        while let Some(reply) = self.held.pop() {
            writer.send(&reply).await?;
        }
        Ok(())
    }

    fn handle(&mut self, request: &Message) -> Reply {
        let command = request.command();
        self.state.lock().unwrap().log.push(command);

        if self.options.hang_up_on == Some(command) {
            return Reply::HangUp;
        }
        if self.options.silent.contains(&command) {
            return Reply::Silent;
        }

        let outcome = match command {
            Smb2Command::Negotiate => self.negotiate(request),
            Smb2Command::SessionSetup => self.session_setup(request),
            Smb2Command::TreeConnect => self.tree_connect(request),
            Smb2Command::Create => self.create(request),
            Smb2Command::Close => self.close(request),
            Smb2Command::Read => return self.read(request),
            Smb2Command::Write => self.write(request),
            Smb2Command::QueryDirectory => self.query_directory(request),
            Smb2Command::SetInfo => self.set_info(request),
            _ => Err(NtStatus::NotSupported),
        };

        Reply::Now(match outcome {
            Ok(reply) => reply,
            Err(status) => failure(request, status),
        })
    }

    fn negotiate(&mut self, request: &Message) -> Reply2 {
        let negotiate = Smb2NegotiateRequest::parse(request.body()).map_err(malformed)?;
        if !negotiate.dialects.contains(&Smb2Dialect::Smb202) {
            return Err(NtStatus::NotSupported);
        }
        let mut response = Smb2NegotiateResponse::new(Smb2Dialect::Smb202);
        response.max_read_size = self.options.max_read_size;
        response.max_write_size = self.options.max_write_size;
        success(request, &response)
    }

    fn session_setup(&mut self, request: &Message) -> Reply2 {
        let setup = Smb2SessionSetupRequest::parse(request.body()).map_err(malformed)?;
        let blob = &setup.security_blob;
        if blob.len() < 12 || &blob[0..8] != NTLMSSP_SIGNATURE {
            return Err(NtStatus::InvalidParameter);
        }

        if blob[8] == NtlmMessageType::Negotiate as u8 {
            if self.options.fail_session_setup {
                return Err(NtStatus::AccessDenied);
            }
            let mut challenge = NtlmChallengeMessage::new("LOOPBACK", self.server_challenge);
            challenge.target_info = encode_av_pairs(&[
                (av_id::NB_DOMAIN_NAME, utf16le_encode("LOOPBACK")),
                (av_id::TIMESTAMP, windows_timestamp().to_le_bytes().to_vec()),
            ]);
            let token = challenge.serialize().map_err(malformed)?;
            let mut header =
                Smb2Header::response_to(request.header(), NtStatus::MoreProcessingRequired);
            header.session_id = SESSION_ID;
            let body = Smb2SessionSetupResponse::new(token)
                .serialize()
                .map_err(malformed)?;
            return Ok(Message::new(header, body));
        }

        let auth = NtlmAuthenticateMessage::parse(blob).map_err(malformed)?;
        let hash = ntlmv2_hash(&self.options.username, &auth.domain, &self.options.password)
            .map_err(malformed)?;
        let user_ok = auth.user_name.eq_ignore_ascii_case(&self.options.username);
        let proof_ok = verify_ntlmv2_response(&hash, &self.server_challenge, &auth.nt_response)
            .map_err(malformed)?;
        if !(user_ok && proof_ok) {
            return Err(NtStatus::LogonFailure);
        }
        success(request, &Smb2SessionSetupResponse::new(Vec::new()))
    }

    fn tree_connect(&mut self, request: &Message) -> Reply2 {
        let tree = Smb2TreeConnectRequest::parse(request.body()).map_err(malformed)?;
        let share = tree.path.rsplit('\\').next().unwrap_or_default();
        if !share.eq_ignore_ascii_case(SHARE) {
            return Err(NtStatus::BadNetworkName);
        }
        let mut header = Smb2Header::response_to(request.header(), NtStatus::Success);
        header.tree_id = TREE_ID;
        let body = Smb2TreeConnectResponse::disk(0x001F_01FF)
            .serialize()
            .map_err(malformed)?;
        Ok(Message::new(header, body))
    }

    fn create(&mut self, request: &Message) -> Reply2 {
        let create = Smb2CreateRequest::parse(request.body()).map_err(malformed)?;
        let path = create.file_name;
        let mut state = self.state.lock().unwrap();

        match create.create_disposition {
            CreateDisposition::Open => {
                if !state.exists(&path) {
                    return Err(NtStatus::ObjectNameNotFound);
                }
                let wants_dir = create
                    .create_options
                    .contains(CreateOptions::FILE_DIRECTORY_FILE);
                if wants_dir && !state.dirs.contains(&path) {
                    return Err(NtStatus::NotADirectory);
                }
            }
            CreateDisposition::Create => {
                if state.exists(&path) {
                    return Err(NtStatus::ObjectNameCollision);
                }
                state.files.insert(path.clone(), Vec::new());
            }
            _ => return Err(NtStatus::NotSupported),
        }

        state.next_handle += 1;
        let id = state.next_handle;
        let mut response = Smb2CreateResponse::new(FileId::new(id, id));
        if state.dirs.contains(&path) {
            response.file_attributes = FileAttributes::DIRECTORY;
        } else {
            response.end_of_file = state.files.get(&path).map_or(0, |data| data.len() as u64);
            response.file_attributes = FileAttributes::ARCHIVE;
        }
        state.open.insert(
            id,
            OpenHandle {
                path,
                listed: false,
                delete_on_close: false,
            },
        );
        drop(state);
        success(request, &response)
    }

    fn close(&mut self, request: &Message) -> Reply2 {
        let close = Smb2CloseRequest::parse(request.body()).map_err(malformed)?;
        let mut state = self.state.lock().unwrap();
        let handle = state
            .open
            .remove(&close.file_id.volatile)
            .ok_or(NtStatus::FileClosed)?;
        if handle.delete_on_close {
            state.files.remove(&handle.path);
        }
        drop(state);
        success(request, &Smb2CloseResponse::default())
    }

    fn read(&mut self, request: &Message) -> Reply {
        let reply = self
            .read_slice(request)
            .and_then(|(last, data)| Ok((last, success(request, &Smb2ReadResponse::new(data))?)));
        match reply {
            Ok((last, reply)) if self.options.reorder_reads.is_some() => Reply::Held(reply, last),
            Ok((_, reply)) => Reply::Now(reply),
            Err(status) => Reply::Now(failure(request, status)),
        }
    }

    /// Requested bytes, and whether they reach the end of the file
    fn read_slice(&self, request: &Message) -> std::result::Result<(bool, Vec<u8>), NtStatus> {
        let read = Smb2ReadRequest::parse(request.body()).map_err(malformed)?;
        if self.options.fail_read_at == Some(read.offset) {
            return Err(NtStatus::InvalidParameter);
        }
        let state = self.state.lock().unwrap();
        let path = &state
            .open
            .get(&read.file_id.volatile)
            .ok_or(NtStatus::FileClosed)?
            .path;
        let data = state.files.get(path).ok_or(NtStatus::FileIsADirectory)?;
        let start = read.offset as usize;
        if start >= data.len() {
            return Err(NtStatus::EndOfFile);
        }
        let end = (start + read.length as usize).min(data.len());
        Ok((end == data.len(), data[start..end].to_vec()))
    }

    fn write(&mut self, request: &Message) -> Reply2 {
        let write = Smb2WriteRequest::parse(request.body()).map_err(malformed)?;
        let mut state = self.state.lock().unwrap();
        let path = state
            .open
            .get(&write.file_id.volatile)
            .ok_or(NtStatus::FileClosed)?
            .path
            .clone();
        let file = state.files.get_mut(&path).ok_or(NtStatus::FileIsADirectory)?;
        let start = write.offset as usize;
        let end = start + write.data.len();
        if file.len() < end {
            file.resize(end, 0);
        }
        file[start..end].copy_from_slice(&write.data);
        state.writes.push((write.offset, write.data.len()));
        drop(state);
        success(
            request,
            &Smb2WriteResponse {
                count: write.data.len() as u32,
            },
        )
    }

    fn query_directory(&mut self, request: &Message) -> Reply2 {
        let query = Smb2QueryDirectoryRequest::parse(request.body()).map_err(malformed)?;
        let mut state = self.state.lock().unwrap();
        let handle = state
            .open
            .get_mut(&query.file_id.volatile)
            .ok_or(NtStatus::FileClosed)?;
        if query.flags & query_directory_flags::RESTART_SCANS != 0 {
            handle.listed = false;
        }
        if handle.listed {
            return Err(NtStatus::NoMoreFiles);
        }
        handle.listed = true;
        let path = handle.path.clone();
        if !state.dirs.contains(&path) {
            return Err(NtStatus::NotADirectory);
        }
        let listing = encode_directory_information(&state.children(&path));
        drop(state);
        success(request, &Smb2QueryDirectoryResponse::new(listing))
    }

    fn set_info(&mut self, request: &Message) -> Reply2 {
        let set = Smb2SetInfoRequest::parse(request.body()).map_err(malformed)?;
        let mut state = self.state.lock().unwrap();
        let path = state
            .open
            .get(&set.file_id.volatile)
            .ok_or(NtStatus::FileClosed)?
            .path
            .clone();

        match set.file_info_class {
            FileInfoClass::EndOfFileInformation => {
                let size: [u8; 8] = set
                    .buffer
                    .get(..8)
                    .and_then(|raw| raw.try_into().ok())
                    .ok_or(NtStatus::InvalidParameter)?;
                let file = state.files.get_mut(&path).ok_or(NtStatus::FileIsADirectory)?;
                file.resize(u64::from_le_bytes(size) as usize, 0);
            }
            FileInfoClass::DispositionInformation => {
                let delete = set.buffer.first().copied().unwrap_or(0) != 0;
                if let Some(handle) = state.open.get_mut(&set.file_id.volatile) {
                    handle.delete_on_close = delete;
                }
            }
            _ => return Err(NtStatus::NotSupported),
        }
        drop(state);
        success(request, &Smb2SetInfoResponse)
    }
}

type Reply2 = std::result::Result<Message, NtStatus>;

fn malformed(e: Error) -> NtStatus {
    tracing::debug!("Loopback server rejected request: {}", e);
    NtStatus::InvalidParameter
}

fn success(request: &Message, body: &impl SmbMessage) -> Reply2 {
    let body = body.serialize().map_err(malformed)?;
    Ok(Message::new(
        Smb2Header::response_to(request.header(), NtStatus::Success),
        body,
    ))
}

fn failure(request: &Message, status: NtStatus) -> Message {
    let body = Smb2ErrorResponse::default()
        .serialize()
        .unwrap_or_default();
    Message::new(Smb2Header::response_to(request.header(), status), body)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_children_are_direct_only() {
        let mut state = ServerState::default();
        state.dirs.insert(String::new());
        state.dirs.insert("sub".to_string());
        state.files.insert("a.txt".to_string(), vec![1, 2, 3]);
        state.files.insert("sub\\deep.txt".to_string(), vec![]);

        let names: Vec<String> = state.children("").into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec![".", "..", "sub", "a.txt"]);
        let names: Vec<String> = state.children("sub").into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec![".", "..", "deep.txt"]);
    }
}
