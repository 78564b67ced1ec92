// SPDX-FileCopyrightText: 2025 RAprogramm <andrey.rozanov.vl@gmail.com>
// SPDX-License-Identifier: MIT

#![allow(dead_code)]

use std::{
    fs,
    io::{Read, Write},
    net,
    path::{Path, PathBuf},
    process::Command,
    sync::{Arc, Mutex},
    thread,
    time::Duration,
};

use tempfile::TempDir;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

/// Bytes committed to the tracked image path by the seed commit.
pub const SEED_IMAGE: &[u8] = b"seed image";
/// Tracked image path in the seeded repository.
pub const IMAGE_PATH: &str = "img/badge.png";

/// A bare repository with one commit on `master`, plus scratch space.
pub struct SeededRemote
{
    pub temp:   TempDir,
    pub remote: PathBuf,
}

impl SeededRemote
{
    pub fn url(&self,) -> String
    {
        self.remote.to_string_lossy().into_owned()
    }

    pub fn workspaces(&self,) -> PathBuf
    {
        self.temp.path().join("workspaces",)
    }

    /// Branch names present on the remote.
    pub fn branches(&self,) -> Vec<String,>
    {
        git(&self.remote, &["for-each-ref", "--format=%(refname:short)", "refs/heads"],)
            .lines()
            .map(str::to_owned,)
            .collect()
    }

    /// Raw bytes of `path` at the tip of `branch`.
    pub fn file_at(&self, branch: &str, path: &str,) -> Vec<u8,>
    {
        let object = format!("{branch}:{path}");
        let output = Command::new("git",)
            .current_dir(&self.remote,)
            .args(["show", object.as_str()],)
            .output()
            .expect("git should run",);
        assert!(output.status.success(), "git show failed: {}", String::from_utf8_lossy(&output.stderr));
        output.stdout
    }

    /// Single-line summary of the tip commit of `branch`.
    pub fn log(&self, branch: &str, format: &str,) -> String
    {
        let format = format!("--format={format}");
        git(&self.remote, &["log", "-1", format.as_str(), branch],)
    }
}

/// Runs git in `dir` with a fixed identity and returns trimmed stdout.
pub fn git(dir: &Path, args: &[&str],) -> String
{
    let output = Command::new("git",)
        .current_dir(dir,)
        .args(["-c", "user.name=Seed", "-c", "user.email=seed@example.com", "-c", "commit.gpgsign=false"],)
        .args(args,)
        .output()
        .expect("git should run",);
    assert!(output.status.success(), "git {args:?} failed: {}", String::from_utf8_lossy(&output.stderr));
    String::from_utf8_lossy(&output.stdout,).trim().to_owned()
}

/// Creates a bare remote whose `master` holds a README and the seed image.
pub fn seeded_remote() -> SeededRemote
{
    let temp = tempfile::tempdir().expect("failed to create tempdir",);
    let remote = temp.path().join("remote.git",);
    let seed = temp.path().join("seed",);
    let remote_arg = remote.to_string_lossy().into_owned();
    let seed_arg = seed.to_string_lossy().into_owned();

    git(temp.path(), &["init", "--quiet", "--bare", remote_arg.as_str()],);
    git(&remote, &["symbolic-ref", "HEAD", "refs/heads/master"],);

    git(temp.path(), &["init", "--quiet", seed_arg.as_str()],);
    git(&seed, &["symbolic-ref", "HEAD", "refs/heads/master"],);
    fs::create_dir_all(seed.join("img",),).expect("failed to create img dir",);
    fs::write(seed.join(IMAGE_PATH,), SEED_IMAGE,).expect("failed to write seed image",);
    fs::write(seed.join("README.md",), "# site\n",).expect("failed to write readme",);
    git(&seed, &["add", "--all"],);
    git(&seed, &["commit", "--quiet", "-m", "Initial commit"],);
    git(&seed, &["push", "--quiet", remote_arg.as_str(), "master"],);

    SeededRemote {
        temp,
        remote,
    }
}

/// Raw HTTP request received by [`serve_once`].
#[derive(Debug,)]
pub struct CapturedRequest
{
    pub head: String,
    pub body: Vec<u8,>,
}

impl CapturedRequest
{
    /// Request line, e.g. `POST /image HTTP/1.1`.
    pub fn request_line(&self,) -> &str
    {
        self.head.lines().next().unwrap_or_default()
    }

    /// Value of the first header called `name`, compared case-insensitively.
    pub fn header(&self, name: &str,) -> Option<&str,>
    {
        self.head.lines().skip(1,).find_map(|line| {
            let (key, value,) = line.split_once(':',)?;
            key.trim().eq_ignore_ascii_case(name,).then(|| value.trim(),)
        },)
    }
}

/// Answers the first connection on a local port with a canned response.
///
/// Returns the base URL and a handle resolving to the captured request. The
/// response is written after `delay`.
pub async fn serve_once(status: &str, body: &str, delay: Duration,) -> (String, JoinHandle<CapturedRequest,>,)
{
    let listener = TcpListener::bind("127.0.0.1:0",).await.expect("failed to bind listener",);
    let address = listener.local_addr().expect("listener has an address",);
    let response = format!(
        "HTTP/1.1 {status}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
        body.len()
    );

    let handle = tokio::spawn(async move {
        let (mut stream, _,) = listener.accept().await.expect("failed to accept connection",);
        let request = read_request(&mut stream,).await;
        tokio::time::sleep(delay,).await;
        let _ = stream.write_all(response.as_bytes(),).await;
        let _ = stream.shutdown().await;
        request
    },);

    (format!("http://{address}"), handle,)
}

async fn read_request(stream: &mut TcpStream,) -> CapturedRequest
{
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];

    let head_end = loop {
        if let Some(index,) = buffer.windows(4,).position(|window| window == b"\r\n\r\n",) {
            break index + 4;
        }
        let read = stream.read(&mut chunk,).await.expect("failed to read request",);
        if read == 0 {
            break buffer.len();
        }
        buffer.extend_from_slice(&chunk[..read],);
    };

    let head = String::from_utf8_lossy(&buffer[..head_end],).into_owned();
    let mut request = CapturedRequest {
        head,
        body: Vec::new(),
    };
    let length = request.header("content-length",).and_then(|value| value.parse::<usize>().ok(),).unwrap_or(0,);

    while buffer.len() < head_end + length {
        let read = stream.read(&mut chunk,).await.expect("failed to read request body",);
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read],);
    }

    request.body = buffer[head_end..].to_vec();
    request
}

/// Git smart HTTP endpoint that rejects every request with `401`.
///
/// Returns the repository URL and the `Authorization` headers seen so far.
pub fn rejecting_http_remote() -> (String, Arc<Mutex<Vec<String,>,>,>,)
{
    let listener = net::TcpListener::bind("127.0.0.1:0",).expect("failed to bind listener",);
    let address = listener.local_addr().expect("listener has an address",);
    let seen = Arc::new(Mutex::new(Vec::new(),),);
    let log = Arc::clone(&seen,);

    thread::spawn(move || {
        for stream in listener.incoming() {
            let Ok(mut stream,) = stream else {
                continue;
            };
            let mut head = Vec::new();
            let mut byte = [0u8; 1];
            while !head.ends_with(b"\r\n\r\n",) {
                match stream.read(&mut byte,) {
                    Ok(1,) => head.push(byte[0],),
                    _ => break,
                }
            }
            let head = String::from_utf8_lossy(&head,).into_owned();
            if let Some(value,) = head.lines().find_map(|line| {
                let (key, value,) = line.split_once(':',)?;
                key.trim().eq_ignore_ascii_case("authorization",).then(|| value.trim().to_owned(),)
            },) {
                log.lock().expect("auth log poisoned",).push(value,);
            }
            let _ = stream.write_all(
                b"HTTP/1.1 401 Unauthorized\r\nWWW-Authenticate: Basic realm=\"badges\"\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
            );
        }
    },);

    (format!("http://{address}/octocat/site.git"), seen,)
}
