use actix::{Handler, MessageResult};
use std::sync::atomic::Ordering;

use super::actor::DownloadCoordinator;
use super::messages::*;

impl Handler<WorkerExited> for DownloadCoordinator {
    type Result = ();
    fn handle(&mut self, msg: WorkerExited, ctx: &mut Self::Context) {
        log::debug!("分段 {} 的工作者已退出", msg.segment_id);
        self.on_worker_exited(msg.segment_id, msg.outcome, ctx);
    }
}

impl Handler<CancelJob> for DownloadCoordinator {
    type Result = ();
    fn handle(&mut self, _msg: CancelJob, ctx: &mut Self::Context) {
        if self.state.is_terminal() {
            return;
        }
        log::info!("收到取消请求: {}", self.job.url);
        self.cancel_flag().store(true, Ordering::SeqCst);
        self.check_finished(ctx);
    }
}

impl Handler<QuerySnapshot> for DownloadCoordinator {
    type Result = MessageResult<QuerySnapshot>;
    fn handle(&mut self, _msg: QuerySnapshot, _ctx: &mut Self::Context) -> Self::Result {
        MessageResult(self.snapshot())
    }
}
