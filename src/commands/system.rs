use colored::Colorize;

pub fn print_help() {
    println!("\n{}", "🤖 Research Copilot Commands:".bold());
    println!("  Just type your question about the indexed papers");
    println!("  Examples:");
    println!("    - what is the difference between skip-gram and CBOW?");
    println!("    - how do transformers handle long sequences?");
    println!();

    println!("📄 Paper Commands:");
    println!("  search <query>   - List matching papers and passages");
    println!("  search-in <paper_id> <query> - Search within one stored paper");
    println!("  extract <pdf>    - Show the title and sections of a PDF");
    println!("  ingest <path>    - Ingest a PDF or every PDF in a folder");
    println!("  papers           - List stored papers");
    println!();

    println!("⚙️ System Commands:");
    println!("  help  - Show this help menu");
    println!("  exit  - Exit the program");
}
