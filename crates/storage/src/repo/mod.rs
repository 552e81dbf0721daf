mod drafts;
mod pending_replies;
