use std::future::Future;

use kiln_grpc::{ExecuteCommandStreamResponse, StreamType};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tonic::Status;

use super::map_service_error;
use crate::model::RunnerError;

/// Capacity of the stdout/stderr byte channels between the cluster gateway
/// and the bridge.
const STREAM_BUFFER: usize = 100;

pub(crate) type CommandStream =
    ReceiverStream<Result<ExecuteCommandStreamResponse, Status>>;

/// Wires a command execution to a response stream. `start` receives the two
/// byte channels whose sole senders it must hand to the cluster gateway; the
/// gateway closes them by dropping. The execution runs on its own task and
/// is aborted when the client goes away.
pub(crate) fn run_command_stream<S, Fut>(start: S) -> CommandStream
where
    S: FnOnce(mpsc::Sender<Vec<u8>>, mpsc::Sender<Vec<u8>>) -> Fut,
    Fut: Future<Output = Result<i32, RunnerError>> + Send + 'static,
{
    let (stdout_tx, stdout_rx) = mpsc::channel(STREAM_BUFFER);
    let (stderr_tx, stderr_rx) = mpsc::channel(STREAM_BUFFER);
    let (frame_tx, frame_rx) = mpsc::channel(16);

    let exec = tokio::spawn(start(stdout_tx, stderr_tx));
    tokio::spawn(pump_frames(stdout_rx, stderr_rx, exec, frame_tx));

    ReceiverStream::new(frame_rx)
}

/// The fan-in select loop. Each data channel is disabled once its sender
/// side closes; the completion branch only runs after both are done, which
/// keeps the terminal frame ordered after every delivered data frame.
/// Exactly one EXIT frame is emitted, or an error status instead of it.
async fn pump_frames(
    stdout_rx: mpsc::Receiver<Vec<u8>>,
    stderr_rx: mpsc::Receiver<Vec<u8>>,
    mut exec: JoinHandle<Result<i32, RunnerError>>,
    tx: mpsc::Sender<Result<ExecuteCommandStreamResponse, Status>>,
) {
    let mut stdout_rx = Some(stdout_rx);
    let mut stderr_rx = Some(stderr_rx);

    loop {
        tokio::select! {
            chunk = recv_open(&mut stdout_rx), if stdout_rx.is_some() => {
                match chunk {
                    Some(data) => {
                        if !data.is_empty()
                            && tx
                                .send(Ok(data_frame(StreamType::Stdout, data)))
                                .await
                                .is_err()
                        {
                            exec.abort();
                            return;
                        }
                    }
                    None => stdout_rx = None,
                }
            }
            chunk = recv_open(&mut stderr_rx), if stderr_rx.is_some() => {
                match chunk {
                    Some(data) => {
                        if !data.is_empty()
                            && tx
                                .send(Ok(data_frame(StreamType::Stderr, data)))
                                .await
                                .is_err()
                        {
                            exec.abort();
                            return;
                        }
                    }
                    None => stderr_rx = None,
                }
            }
            result = &mut exec, if stdout_rx.is_none() && stderr_rx.is_none() => {
                let frame = match result {
                    Ok(Ok(exit_code)) => Ok(exit_frame(exit_code)),
                    Ok(Err(err)) => Err(map_service_error(err)),
                    Err(join_err) => Err(Status::internal(format!(
                        "execution task failed: {join_err}"
                    ))),
                };
                let _ = tx.send(frame).await;
                return;
            }
            _ = tx.closed() => {
                exec.abort();
                return;
            }
        }
    }
}

async fn recv_open(
    rx: &mut Option<mpsc::Receiver<Vec<u8>>>,
) -> Option<Vec<u8>> {
    match rx.as_mut() {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

fn data_frame(kind: StreamType, data: Vec<u8>) -> ExecuteCommandStreamResponse {
    ExecuteCommandStreamResponse {
        r#type: kind as i32,
        data,
        exit_code: 0,
    }
}

fn exit_frame(exit_code: i32) -> ExecuteCommandStreamResponse {
    ExecuteCommandStreamResponse {
        r#type: StreamType::Exit as i32,
        data: Vec::new(),
        exit_code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::sync::oneshot;
    use tokio_stream::StreamExt;

    async fn collect(
        mut stream: CommandStream,
    ) -> Vec<Result<ExecuteCommandStreamResponse, Status>> {
        let mut frames = Vec::new();
        while let Some(frame) = stream.next().await {
            frames.push(frame);
        }
        frames
    }

    #[tokio::test]
    async fn frames_keep_intra_stream_order_and_end_with_one_exit() {
        let stream = run_command_stream(|stdout_tx, stderr_tx| async move {
            stdout_tx.send(b"one\n".to_vec()).await.unwrap();
            stderr_tx.send(b"warn\n".to_vec()).await.unwrap();
            stdout_tx.send(b"two\n".to_vec()).await.unwrap();
            Ok(0)
        });

        let frames = collect(stream).await;
        let frames: Vec<_> = frames.into_iter().map(Result::unwrap).collect();

        let stdout: Vec<_> = frames
            .iter()
            .filter(|f| f.r#type == StreamType::Stdout as i32)
            .map(|f| f.data.clone())
            .collect();
        assert_eq!(stdout, vec![b"one\n".to_vec(), b"two\n".to_vec()]);

        let exits: Vec<_> = frames
            .iter()
            .filter(|f| f.r#type == StreamType::Exit as i32)
            .collect();
        assert_eq!(exits.len(), 1);
        assert_eq!(exits[0].exit_code, 0);
        // nothing after the terminal frame
        assert_eq!(frames.last().unwrap().r#type, StreamType::Exit as i32);
    }

    #[tokio::test]
    async fn nonzero_exit_code_reaches_the_client() {
        let stream = run_command_stream(|_stdout_tx, stderr_tx| async move {
            stderr_tx.send(b"no such file\n".to_vec()).await.unwrap();
            Ok(2)
        });

        let frames = collect(stream).await;
        let last = frames.last().unwrap().as_ref().unwrap();
        assert_eq!(last.r#type, StreamType::Exit as i32);
        assert_eq!(last.exit_code, 2);
    }

    #[tokio::test]
    async fn service_error_becomes_a_status_instead_of_exit() {
        let stream = run_command_stream(|_stdout_tx, _stderr_tx| async move {
            Err(RunnerError::NotRunning("runner-1 is creating".into()))
        });

        let frames = collect(stream).await;
        assert_eq!(frames.len(), 1);
        let status = frames.into_iter().next().unwrap().unwrap_err();
        assert_eq!(status.code(), tonic::Code::FailedPrecondition);
    }

    #[tokio::test]
    async fn empty_chunks_are_not_forwarded() {
        let stream = run_command_stream(|stdout_tx, _stderr_tx| async move {
            stdout_tx.send(Vec::new()).await.unwrap();
            stdout_tx.send(b"data".to_vec()).await.unwrap();
            Ok(0)
        });

        let frames = collect(stream).await;
        let data_frames: Vec<_> = frames
            .iter()
            .filter(|f| {
                f.as_ref().unwrap().r#type == StreamType::Stdout as i32
            })
            .collect();
        assert_eq!(data_frames.len(), 1);
    }

    struct SignalOnDrop(Option<oneshot::Sender<()>>);
    impl Drop for SignalOnDrop {
        fn drop(&mut self) {
            if let Some(tx) = self.0.take() {
                let _ = tx.send(());
            }
        }
    }

    #[tokio::test]
    async fn client_disconnect_aborts_the_execution() {
        let (dropped_tx, dropped_rx) = oneshot::channel();
        let stream = run_command_stream(move |_stdout_tx, _stderr_tx| {
            let guard = SignalOnDrop(Some(dropped_tx));
            async move {
                let _guard = guard;
                std::future::pending::<()>().await;
                Ok(0)
            }
        });

        drop(stream);

        tokio::time::timeout(Duration::from_secs(1), dropped_rx)
            .await
            .expect("execution was not cancelled")
            .expect("drop signal lost");
    }
}
